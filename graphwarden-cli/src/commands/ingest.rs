//! `graphwarden ingest` command handler

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use graphwarden_core::error::{ErrorKind, GraphwardenError};
use graphwarden_detection::DetectionReport;
use graphwarden_graph::MemoryGraphStore;
use graphwarden_ingest::{
    IngestOutcome, IngestionMode, IngestionRouter, MemoryBroker, MemoryDeadLetterSink,
    QueueProducer, QueueWorker, RetryPolicy, WorkerStats, assign_partitions,
};

use crate::app::{App, Backend, read_lines};
use crate::cli::{IngestArgs, ModeArg};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Upper bound for draining the in-process queue after a queued ingest.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Execute the `ingest` command.
pub async fn execute(app: App, args: IngestArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let mode = match args.mode {
        Some(ModeArg::Direct) => IngestionMode::Direct,
        Some(ModeArg::Queued) => IngestionMode::Queued,
        None => app
            .config
            .ingest
            .default_mode
            .parse::<IngestionMode>()
            .map_err(GraphwardenError::from)?,
    };
    let lines = read_lines(&args.input).await?;
    let hint = args.format.as_deref();
    info!(lines = lines.len(), mode = %mode, hint = ?hint, "ingesting input");

    let mut report = IngestReport {
        mode,
        accepted: 0,
        failed: 0,
        results: Vec::with_capacity(lines.len()),
        queue: None,
        detection: None,
    };

    match app.backend()? {
        Backend::Memory => {
            let broker = MemoryBroker::from_config(&app.config.queue);
            let router = IngestionRouter::new(
                Arc::clone(&app.normalizer),
                app.adapter(),
                Arc::new(broker.clone()),
            );
            ingest_lines(&router, &lines, hint, mode, &mut report).await;
            if mode == IngestionMode::Queued && report.accepted > 0 {
                report.queue = Some(drain_memory_queue(&app, &broker).await?);
            }
        }
        Backend::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let producer = graphwarden_ingest::KafkaProducer::from_config(&app.config.queue)
                    .map_err(GraphwardenError::from)?;
                let router =
                    IngestionRouter::new(Arc::clone(&app.normalizer), app.adapter(), Arc::new(producer));
                ingest_lines(&router, &lines, hint, mode, &mut report).await;
            }
            #[cfg(not(feature = "kafka"))]
            return Err(kafka_unavailable());
        }
    }

    if args.detect {
        app.load_rules().await?;
        report.detection = Some(app.engine().run_all().await);
    }

    writer.render(&report)?;

    if report.failed > 0 {
        return Err(CliError::Command(format!(
            "{} of {} lines failed",
            report.failed,
            report.results.len()
        )));
    }
    if let Some(detection) = &report.detection {
        if detection.has_errors() {
            return Err(CliError::Detection {
                failed: detection.errors.len(),
            });
        }
    }
    Ok(())
}

#[cfg(not(feature = "kafka"))]
pub(crate) fn kafka_unavailable() -> CliError {
    CliError::Config(
        "queue.backend = \"kafka\" requires a build with the `kafka` feature".to_owned(),
    )
}

async fn ingest_lines<P: QueueProducer>(
    router: &IngestionRouter<MemoryGraphStore, P>,
    lines: &[String],
    hint: Option<&str>,
    mode: IngestionMode,
    report: &mut IngestReport,
) {
    for (index, line) in lines.iter().enumerate() {
        let result = match router.ingest(line.as_bytes(), hint, mode).await {
            Ok(outcome) => {
                report.accepted += 1;
                LineResult {
                    line: index + 1,
                    outcome: Some(outcome),
                    error: None,
                    kind: None,
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(line = index + 1, error = %e, "line rejected");
                LineResult {
                    line: index + 1,
                    outcome: None,
                    kind: Some(e.kind()),
                    error: Some(e.to_string()),
                }
            }
        };
        report.results.push(result);
    }
}

/// In-process broker: run one worker per partition group until the lag reaches zero.
async fn drain_memory_queue(app: &App, broker: &MemoryBroker) -> Result<WorkerStats, CliError> {
    let partitions = broker.partition_count().await;
    let sink = Arc::new(MemoryDeadLetterSink::new());
    let group = app.config.queue.consumer_group.clone();
    let shutdown = CancellationToken::new();
    let workers = (partitions as usize).clamp(1, 4);

    let mut handles = Vec::with_capacity(workers);
    for (i, assigned) in assign_partitions(partitions, workers).into_iter().enumerate() {
        let consumer = broker
            .consumer(&group, assigned)
            .await
            .map_err(GraphwardenError::from)?;
        let worker = QueueWorker::new(
            format!("worker-{i}"),
            consumer,
            Arc::clone(&app.normalizer),
            app.adapter(),
            Arc::clone(&sink),
            RetryPolicy::from_config(&app.config.queue),
        )
        .with_poll_interval(Duration::from_millis(20));
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while broker.lag(&group).await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    shutdown.cancel();

    let mut total = WorkerStats::default();
    for handle in handles {
        let stats = handle
            .await
            .map_err(|e| CliError::Command(format!("queue worker failed: {e}")))?;
        total.merge(&stats);
    }

    if drained.is_err() {
        return Err(CliError::Command(format!(
            "queue not drained within {}s ({} messages left)",
            DRAIN_TIMEOUT.as_secs(),
            broker.lag(&group).await
        )));
    }
    for record in sink.records().await {
        tracing::error!(kind = %record.error_kind, detail = %record.error_detail, "message dead-lettered");
    }
    Ok(total)
}

#[derive(Serialize)]
pub struct IngestReport {
    pub mode: IngestionMode,
    pub accepted: usize,
    pub failed: usize,
    pub results: Vec<LineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<WorkerStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionReport>,
}

#[derive(Serialize)]
pub struct LineResult {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IngestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Render for IngestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Ingest ({}): {} accepted, {} failed",
            self.mode,
            self.accepted.to_string().green(),
            if self.failed > 0 {
                self.failed.to_string().red()
            } else {
                self.failed.to_string().normal()
            }
        )?;
        for result in &self.results {
            match (&result.outcome, &result.error) {
                (Some(outcome), _) => writeln!(w, "  line {:<5} {outcome}", result.line)?,
                (None, Some(error)) => {
                    writeln!(w, "  line {:<5} {}", result.line, error.red())?
                }
                (None, None) => {}
            }
        }
        if let Some(stats) = &self.queue {
            writeln!(
                w,
                "Queue: {} processed, {} dead-lettered, {} redelivered",
                stats.processed, stats.dead_lettered, stats.redelivered
            )?;
        }
        if let Some(detection) = &self.detection {
            writeln!(w)?;
            detection.render_text(w)?;
        }
        Ok(())
    }
}
