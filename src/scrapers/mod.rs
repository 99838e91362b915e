pub mod base;
pub mod naver;
