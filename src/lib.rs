// lib.rs
pub mod alignment_record;
pub mod commands;
pub mod contig_index;
pub mod orf;
pub mod progress;
pub mod store;
