pub mod fs;
pub mod web;
