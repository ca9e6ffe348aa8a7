use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct YardstickCli {
    /// Path to the YAML task file listing the scenarios to run
    #[clap(short, long)]
    pub task: PathBuf,

    /// File to write result records to, one JSON object per line.
    ///
    /// Defaults to `yardstick-<run_id>.jsonl` in the current directory. Records are appended if
    /// the file already exists.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// An identifier for this run. A random one is generated if this is not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar for `Duration` runners.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

impl YardstickCli {
    pub fn new(task: impl Into<PathBuf>) -> Self {
        Self {
            task: task.into(),
            output: None,
            run_id: None,
            no_progress: true,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// The result destination, falling back to a name derived from the run id.
    pub fn output_path(&self, run_id: &str) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("yardstick-{run_id}.jsonl")))
    }
}
