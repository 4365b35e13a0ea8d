use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use canonreport::config::Config;
use canonreport::{Aggregator, TapReporter, TestStatus, logging, pipeline, source};

#[tokio::main]
async fn main() -> Result<()> {
    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load(&workspace);
    logging::init(&config.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let source = source::detect(&config, args)?;
    tracing::info!(source = source.name(), "reading events");

    let out: Box<dyn Write> = match &config.output.file {
        Some(path) => {
            let path = workspace.join(path);
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    };

    let mut aggregator = Aggregator::new();
    aggregator.register(TapReporter::new(out));

    pipeline::drive(source, &mut aggregator).await?;

    let failures = aggregator.reporter_failures();
    if !failures.is_empty() {
        bail!("{} reporter failure(s), first: {}", failures.len(), failures[0].message);
    }

    let failed = aggregator
        .run()
        .is_some_and(|run| run.status == Some(TestStatus::Failed));
    if failed {
        std::process::exit(1);
    }

    Ok(())
}
