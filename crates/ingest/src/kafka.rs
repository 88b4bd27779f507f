//! Kafka 백엔드 (feature `kafka`)
//!
//! 오프셋 자동 커밋을 끄고, 영속화가 끝난 메시지만 명시적으로 커밋합니다.
//! 해제(nack)된 메시지는 해당 오프셋으로 seek하여 다시 읽습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use graphwarden_core::config::QueueConfig;
use graphwarden_core::error::BrokerError;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{info, warn};

use crate::broker::{DeadLetterSink, QueueConsumer, QueueProducer};
use crate::message::{BrokerHealth, DeadLetterRecord, Delivery, DeliveryReceipt, QueueMessage};

fn producer_config(config: &QueueConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("message.timeout.ms", config.message_timeout_ms.to_string());
    client
}

async fn send(
    producer: &FutureProducer,
    topic: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<DeliveryReceipt, BrokerError> {
    let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(body);
    match producer.send(record, Timeout::After(timeout)).await {
        Ok((partition, offset)) => Ok(DeliveryReceipt {
            partition: u32::try_from(partition).unwrap_or(0),
            offset: u64::try_from(offset).unwrap_or(0),
        }),
        Err((e, _)) => Err(BrokerError::Unavailable(e.to_string())),
    }
}

/// Kafka 프로듀서
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaProducer {
    pub fn from_config(config: &QueueConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("producer creation failed: {e}")))?;
        info!(servers = %config.bootstrap_servers, topic = %config.topic, "kafka producer created");
        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: config.message_timeout(),
        })
    }
}

impl QueueProducer for KafkaProducer {
    async fn enqueue(&self, message: QueueMessage) -> Result<DeliveryReceipt, BrokerError> {
        let body = message.encode()?;
        send(&self.producer, &self.topic, &body, self.timeout).await
    }

    async fn health(&self) -> BrokerHealth {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;
        // fetch_metadata는 블로킹 호출
        let result = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Timeout::After(timeout))
                .map(|metadata| metadata.topics().len())
        })
        .await;
        match result {
            Ok(Ok(_)) => BrokerHealth::Healthy,
            Ok(Err(e)) => BrokerHealth::Unavailable(e.to_string()),
            Err(e) => BrokerHealth::Unavailable(format!("health probe failed: {e}")),
        }
    }
}

/// Kafka 그룹 컨슈머
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
    seek_timeout: Duration,
    redeliveries: HashMap<(u32, u64), u32>,
}

impl KafkaConsumer {
    /// 설정된 토픽을 구독하는 컨슈머를 생성합니다. 파티션은 그룹 코디네이터가 할당합니다.
    pub fn from_config(config: &QueueConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("consumer creation failed: {e}")))?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| BrokerError::Unavailable(format!("subscribe failed: {e}")))?;
        info!(
            group = %config.consumer_group,
            topic = %config.topic,
            "kafka consumer subscribed"
        );
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
            seek_timeout: config.message_timeout(),
            redeliveries: HashMap::new(),
        })
    }
}

impl QueueConsumer for KafkaConsumer {
    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let message = match tokio::time::timeout(wait, self.consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(BrokerError::Unavailable(e.to_string())),
            Ok(Ok(message)) => message,
        };
        let partition = u32::try_from(message.partition()).unwrap_or(0);
        let offset = u64::try_from(message.offset()).unwrap_or(0);
        Ok(Some(Delivery {
            body: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
            partition,
            offset,
            redelivery_count: self
                .redeliveries
                .get(&(partition, offset))
                .copied()
                .unwrap_or(0),
        }))
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &self.topic,
                i32::try_from(delivery.partition).unwrap_or(0),
                Offset::Offset(i64::try_from(delivery.offset + 1).unwrap_or(i64::MAX)),
            )
            .map_err(|e| BrokerError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::Commit(e.to_string()))?;
        self.redeliveries
            .remove(&(delivery.partition, delivery.offset));
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        *self
            .redeliveries
            .entry((delivery.partition, delivery.offset))
            .or_insert(0) += 1;
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let partition = i32::try_from(delivery.partition).unwrap_or(0);
        let offset = Offset::Offset(i64::try_from(delivery.offset).unwrap_or(i64::MAX));
        let timeout = Timeout::After(self.seek_timeout);
        // seek는 블로킹 호출
        let result = tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, offset, timeout)
        })
        .await
        .map_err(|e| BrokerError::Unavailable(format!("seek task failed: {e}")))?;
        result.map_err(|e| {
            warn!(error = %e, partition = delivery.partition, "seek for redelivery failed");
            BrokerError::Unavailable(e.to_string())
        })
    }
}

/// Kafka 데드레터 토픽 싱크
pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetterSink {
    pub fn from_config(config: &QueueConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("producer creation failed: {e}")))?;
        Ok(Self {
            producer,
            topic: config.dead_letter_topic.clone(),
            timeout: config.message_timeout(),
        })
    }
}

impl DeadLetterSink for KafkaDeadLetterSink {
    async fn publish(&self, record: DeadLetterRecord) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(&record).map_err(|e| BrokerError::Codec(e.to_string()))?;
        send(&self.producer, &self.topic, &body, self.timeout)
            .await
            .map(|_| ())
    }
}
