pub mod gsc_parser;

pub use gsc_parser::SearchAnalyticsParser;
