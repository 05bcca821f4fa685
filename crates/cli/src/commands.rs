use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Create `user_data` and load it from a CSV file
    Seed {
        #[arg(long, help = "CSV file with user_id,name,email,age columns")]
        csv: PathBuf,
    },
    /// Stream every user as JSON lines
    Stream {
        #[arg(long, help = "Stop after this many rows")]
        limit: Option<usize>,
    },
    /// Read users in batches and keep those older than --min-age
    Batches {
        #[arg(long, help = "Rows fetched per batch")]
        size: usize,

        #[arg(long, default_value_t = 25)]
        min_age: i64,
    },
    Paginate {
        #[arg(long, help = "Rows per page")]
        page_size: usize,

        #[arg(long, help = "Stop after this many pages")]
        max_pages: Option<usize>,
    },
    /// Streaming mean of a numeric column
    Average {
        #[arg(long, default_value = "age")]
        column: String,
    },
    /// Count, sum, min, max and mean of a numeric column
    Stats {
        #[arg(long, default_value = "age")]
        column: String,

        #[arg(long, value_delimiter = ',', help = "Percentiles to estimate, e.g. 50,90,99")]
        percentiles: Vec<f64>,
    },
    /// Open a connection and run `SELECT 1`
    TestConn,
}
