//! `graphwarden consume` command handler
//!
//! Runs a consumer group against the Kafka topic until Ctrl-C or until every
//! worker has used up its message budget.

use std::io::Write;

use serde::Serialize;

use graphwarden_ingest::WorkerStats;

use crate::app::{App, Backend};
use crate::cli::ConsumeArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `consume` command.
pub async fn execute(app: App, args: ConsumeArgs, writer: &OutputWriter) -> Result<(), CliError> {
    if args.workers == 0 {
        return Err(CliError::Command("--workers must be at least 1".to_owned()));
    }

    match app.backend()? {
        Backend::Memory => Err(CliError::Command(
            "consume needs a shared broker; set queue.backend = \"kafka\" \
             or use `ingest --mode queued` with the memory backend"
                .to_owned(),
        )),
        Backend::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let stats = kafka::run(&app, &args).await?;
                let report = ConsumeReport {
                    workers: args.workers,
                    topic: app.config.queue.topic.clone(),
                    stats,
                };
                writer.render(&report)?;
                Ok(())
            }
            #[cfg(not(feature = "kafka"))]
            {
                let _ = writer;
                Err(super::ingest::kafka_unavailable())
            }
        }
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;
    use tracing::{info, warn};

    use graphwarden_core::error::GraphwardenError;
    use graphwarden_ingest::{
        KafkaConsumer, KafkaDeadLetterSink, QueueWorker, RetryPolicy, WorkerStats,
    };

    use crate::app::App;
    use crate::cli::ConsumeArgs;
    use crate::error::CliError;

    pub(super) async fn run(app: &App, args: &ConsumeArgs) -> Result<WorkerStats, CliError> {
        let queue = &app.config.queue;
        let sink = Arc::new(KafkaDeadLetterSink::from_config(queue).map_err(GraphwardenError::from)?);
        let shutdown = CancellationToken::new();

        let mut handles = Vec::with_capacity(args.workers);
        for i in 0..args.workers {
            let consumer = KafkaConsumer::from_config(queue).map_err(GraphwardenError::from)?;
            let mut worker = QueueWorker::new(
                format!("worker-{i}"),
                consumer,
                Arc::clone(&app.normalizer),
                app.adapter(),
                Arc::clone(&sink),
                RetryPolicy::from_config(queue),
            );
            if let Some(max) = args.max_messages {
                worker = worker.with_max_messages(max);
            }
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }
        info!(workers = args.workers, topic = %queue.topic, "consumer group started");

        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
            signal.cancel();
        });

        let mut total = WorkerStats::default();
        for handle in handles {
            let stats = handle
                .await
                .map_err(|e| CliError::Command(format!("queue worker failed: {e}")))?;
            total.merge(&stats);
        }
        Ok(total)
    }
}

#[derive(Serialize)]
pub struct ConsumeReport {
    pub workers: usize,
    pub topic: String,
    pub stats: WorkerStats,
}

impl Render for ConsumeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Consumer group on {}", self.topic.bold())?;
        writeln!(w, "  Workers:        {}", self.workers)?;
        writeln!(w, "  Processed:      {}", self.stats.processed)?;
        writeln!(w, "  Dead-lettered:  {}", self.stats.dead_lettered)?;
        writeln!(w, "  Redelivered:    {}", self.stats.redelivered)?;
        writeln!(w, "  Commit errors:  {}", self.stats.commit_failures)?;
        Ok(())
    }
}
