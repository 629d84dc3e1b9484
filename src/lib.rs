// Headline scraper: fetch a news page, extract `article h2 > a` headlines, keep them in SQLite.

pub mod config;
pub mod fetcher;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod web;
