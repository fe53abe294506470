pub mod record_bench;
