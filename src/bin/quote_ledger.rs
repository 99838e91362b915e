use quote_ledger::config::Config;
use quote_ledger::data_provider::Resolution;
use quote_ledger::extractor::ExtractionMode;
use quote_ledger::scrapers::naver::NaverScraper;
use quote_ledger::services::quote_service::{BatchReport, QuoteService};
use quote_ledger::services::scheduler::CrawlScheduler;
use quote_ledger::util;

use anyhow::Context;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, warn};
use std::sync::Arc;

fn build_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mode = matches
        .value_of("mode")
        .unwrap_or("structured")
        .parse::<ExtractionMode>()
        .map_err(anyhow::Error::msg)?;

    let config = Config::new()
        .with_data_dir(matches.value_of("data-dir").unwrap_or("data"))
        .with_currency_pair(matches.value_of("currency-pair").unwrap_or("USD/KRW"))
        .with_extraction_mode(mode)
        .with_collect_exchange(!matches.is_present("no-exchange"));

    Ok(config)
}

fn print_report(report: &BatchReport) {
    info!("{:-<60}", "");
    info!("{:<12} {:<10} {:<10} {:<10} {:<10} {:<10}",
          "Requested", "Complete", "Partial", "Skipped", "Failed", "Rows");
    info!("{:<12} {:<10} {:<10} {:<10} {:<10} {:<10}",
          report.requested, report.complete, report.partial, report.skipped, report.failed, report.rows_written);
    if !report.exchange_collected {
        warn!("Exchange rate was not collected for this batch");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let app = App::new("QuoteLedger")
        .version("1.0.0")
        .about("Collect stock quotes and exchange rates into a CSV ledger")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the ledger, codes file and code directory")
                .takes_value(true)
                .default_value("data"),
        )
        .arg(
            Arg::with_name("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("How change data is extracted (text, structured)")
                .takes_value(true)
                .possible_values(["text", "structured"])
                .default_value("structured"),
        )
        .arg(
            Arg::with_name("currency-pair")
                .long("currency-pair")
                .value_name("PAIR")
                .help("Label written to the currencyPair column")
                .takes_value(true)
                .default_value("USD/KRW"),
        )
        .arg(
            Arg::with_name("no-exchange")
                .long("no-exchange")
                .help("Do not collect the exchange rate")
                .takes_value(false),
        );

    // 添加子命令
    let app = app
        .subcommand(
            SubCommand::with_name("crawl")
                .about("Collect quotes once and append them to the ledger")
                .arg(
                    Arg::with_name("code")
                        .short('c')
                        .long("code")
                        .value_name("CODE")
                        .help("Instrument code to collect (repeatable)")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("codes-file")
                        .long("codes-file")
                        .value_name("PATH")
                        .help("File with one instrument code per line, relative to the working directory")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Find an instrument by name and collect it when the match is unique")
                .arg(
                    Arg::with_name("name")
                        .value_name("NAME")
                        .help("Instrument name or part of it")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("directory")
                .about("Load or rebuild the instrument code directory")
                .arg(
                    Arg::with_name("rebuild")
                        .short('r')
                        .long("rebuild")
                        .help("Crawl the market listing even if the directory file exists")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("schedule")
                .about("Collect quotes at fixed times every day until Ctrl-C")
                .arg(
                    Arg::with_name("at")
                        .long("at")
                        .value_name("HH:MM")
                        .help("Daily crawl time (repeatable)")
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::with_name("codes-file")
                        .long("codes-file")
                        .value_name("PATH")
                        .help("File with one instrument code per line, relative to the working directory")
                        .takes_value(true),
                ),
        );

    let matches = app.get_matches();
    let mut config = build_config(&matches)?;

    if let Some(matches) = matches.subcommand_matches("crawl") {
        if let Some(path) = matches.value_of("codes-file") {
            let path = util::resolve_from_cwd(path)?;
            config = config.with_codes_file(&path.to_string_lossy());
        }
        let codes: Vec<String> = match matches.values_of("code") {
            Some(values) => values.map(str::to_string).collect(),
            None => util::read_codes_file(config.codes_path())
                .with_context(|| format!("reading codes from {}", config.codes_path().display()))?,
        };

        let scraper = NaverScraper::new(&config)?;
        let service = QuoteService::new(config, Arc::new(scraper));
        let report = service.run_batch(&codes).await?;
        print_report(&report);
    } else if let Some(matches) = matches.subcommand_matches("search") {
        let query = matches.value_of("name").unwrap_or_default();

        let scraper = NaverScraper::new(&config)?;
        let service = QuoteService::new(config, Arc::new(scraper));
        match service.search_and_run(query).await? {
            (Resolution::Unique(instrument), Some(report)) => {
                info!("Collected {} ({})", instrument.name, instrument.code);
                print_report(&report);
            }
            (Resolution::Ambiguous(matches), _) => {
                info!("Several instruments match {:?}:", query);
                for instrument in matches {
                    info!("  {:<10} {:<20} {:?}", instrument.code, instrument.name, instrument.market);
                }
            }
            _ => info!("No instrument matches {:?}", query),
        }
    } else if let Some(matches) = matches.subcommand_matches("directory") {
        let rebuild = matches.is_present("rebuild");

        let scraper = NaverScraper::new(&config)?;
        let service = QuoteService::new(config, Arc::new(scraper));
        let directory = service.load_directory(rebuild).await?;
        info!("Instrument directory holds {} entries", directory.len());
    } else if let Some(matches) = matches.subcommand_matches("schedule") {
        if let Some(path) = matches.value_of("codes-file") {
            let path = util::resolve_from_cwd(path)?;
            config = config.with_codes_file(&path.to_string_lossy());
        }
        if let Some(values) = matches.values_of("at") {
            let times = values
                .map(util::parse_schedule_time)
                .collect::<quote_ledger::Result<Vec<_>>>()
                .context("parsing --at schedule times")?;
            config = config.with_schedule_times(times);
        }

        let scheduler = CrawlScheduler::new(config.schedule_times.clone(), config.schedule_timezone)?;
        info!("Scheduled times ({}): {:?}", config.schedule_timezone, scheduler.times());

        let scraper = NaverScraper::new(&config)?;
        let service = Arc::new(QuoteService::new(config, Arc::new(scraper)));
        let handle = scheduler.start(service);

        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        info!("Stop requested, waiting for the running crawl to finish");
        let ticks = handle.stop().await;
        info!("Scheduler ran {} crawls", ticks);
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}
