//! # graphwarden-ingest
//!
//! 원시 보안 이벤트를 그래프까지 전달하는 두 경로를 제공합니다.
//!
//! - [`router`]: Direct/Queued 수집 라우터
//! - [`broker`]: 프로듀서, 컨슈머, 데드레터 싱크 trait
//! - [`memory`]: 인메모리 파티션 브로커
//! - [`worker`]: 재시도/데드레터 정책을 가진 큐 워커
//! - `kafka`: Kafka 백엔드 (feature `kafka`)
//!
//! # 사용 예시
//! ```ignore
//! let router = IngestionRouter::new(normalizer, adapter, Arc::new(broker.clone()));
//! router.ingest(raw, Some("cef"), IngestionMode::Queued).await?;
//!
//! let consumer = broker.consumer("graphwarden-consumer", [0, 1]).await?;
//! let stats = QueueWorker::new("worker-0", consumer, normalizer, adapter, sink, policy)
//!     .run(shutdown)
//!     .await;
//! ```

pub mod broker;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod router;
pub mod worker;

pub use broker::{DeadLetterSink, QueueConsumer, QueueProducer};
pub use error::IngestError;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumer, KafkaDeadLetterSink, KafkaProducer};
pub use memory::{MemoryBroker, MemoryConsumer, MemoryDeadLetterSink, assign_partitions};
pub use message::{BrokerHealth, DeadLetterRecord, Delivery, DeliveryReceipt, QueueMessage};
pub use router::{EnqueueAck, EventSubmission, IngestOutcome, IngestionMode, IngestionRouter};
pub use worker::{QueueWorker, RetryPolicy, WorkerStats};
