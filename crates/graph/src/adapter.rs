//! 영속화 어댑터 -- 정규 이벤트를 멱등 그래프 병합으로 변환합니다.
//!
//! 이벤트 하나는 Event 노드, 관련 엔티티 노드, 관계로 구성된 [`WriteSet`]이 되고
//! 저장소가 이를 하나의 트랜잭션으로 병합합니다.

use std::sync::Arc;

use chrono::SecondsFormat;
use graphwarden_core::error::StorageError;
use graphwarden_core::event::{CanonicalEvent, Endpoint, EventRef, Resource};
use graphwarden_core::metrics as m;
use graphwarden_core::types::{FieldMap, FieldValue};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::model::{Node, NodeKey, NodeLabel, RelKey, RelType, Relationship, WriteSet};
use crate::store::GraphStore;

/// 정규 이벤트 영속화 어댑터
pub struct PersistenceAdapter<S: GraphStore> {
    store: Arc<S>,
}

impl<S: GraphStore> Clone for PersistenceAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore> PersistenceAdapter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 공유 저장소
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 이벤트를 그래프에 병합합니다.
    ///
    /// 같은 식별 키로 다시 영속화하면 노드와 관계는 중복되지 않습니다.
    /// 실패 시 아무것도 기록되지 않습니다.
    pub async fn persist(&self, event: &CanonicalEvent) -> Result<EventRef, StorageError> {
        let writes = build_write_set(event)?;
        let id = writes.event.id.key.clone();
        let entities = writes.entities.len();

        let outcome = self.store.merge(writes).await?;
        metrics::counter!(m::EVENTS_PERSISTED_TOTAL, m::LABEL_OUTCOME => outcome.as_str())
            .increment(1);
        info!(
            event_id = %id,
            class_uid = %event.class_uid,
            entities,
            outcome = outcome.as_str(),
            "event persisted"
        );
        Ok(EventRef { id, outcome })
    }
}

/// 이벤트 식별 키를 계산합니다.
///
/// `metadata.uid`, `extensions`의 `id`/`uid` 순으로 제공된 값을 사용하고,
/// 없으면 `class_uid | time | 이벤트 JSON`의 SHA-256 hex입니다.
pub fn event_key(event: &CanonicalEvent) -> Result<String, StorageError> {
    let supplied = event
        .metadata
        .uid
        .clone()
        .or_else(|| {
            ["id", "uid"]
                .iter()
                .find_map(|key| event.extensions.get(*key).and_then(FieldValue::render))
        })
        .filter(|id| !id.trim().is_empty());
    if let Some(id) = supplied {
        return Ok(id);
    }

    // serde_json::Map은 키 순서로 정렬됩니다.
    let canonical = serde_json::to_value(event)
        .and_then(|value| serde_json::to_string(&value))
        .map_err(|e| StorageError::Transaction(format!("cannot encode event: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(event.class_uid.as_bytes());
    hasher.update(b"|");
    hasher.update(rfc3339(event).as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn rfc3339(event: &CanonicalEvent) -> String {
    event.time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 이벤트에서 병합할 노드와 관계를 만듭니다.
pub fn build_write_set(event: &CanonicalEvent) -> Result<WriteSet, StorageError> {
    let event_id = NodeKey::new(NodeLabel::Event, event_key(event)?);
    let mut builder = WriteSetBuilder::new(event_id.clone(), rfc3339(event));

    if let Some(src) = &event.src {
        for key in endpoint_keys(src) {
            builder.link(Direction::Generated, key, endpoint_properties(src));
        }
    }
    if let Some(principal) = &event.principal {
        if let Some(name) = principal.name.as_deref().filter(|n| !n.trim().is_empty()) {
            let mut props = FieldMap::new();
            props.insert("name".into(), name.into());
            if let Some(domain) = &principal.domain {
                props.insert("domain".into(), domain.as_str().into());
            }
            if let Some(id) = &principal.id {
                props.insert("id".into(), id.as_str().into());
            }
            builder.link(
                Direction::Performed,
                NodeKey::new(NodeLabel::User, user_key(name, principal.domain.as_deref())),
                props,
            );
        }
    }
    if let Some(dst) = &event.dst {
        for key in endpoint_keys(dst) {
            builder.link(Direction::Targets, key, endpoint_properties(dst));
        }
    }
    for resource in &event.resources {
        if let Some((key, props)) = resource_node(resource) {
            builder.link(Direction::Targets, key, props);
        }
    }

    let properties = event_properties(event)?;
    debug!(event = %event_id, entities = builder.entities.len(), "write set built");
    Ok(builder.finish(Node {
        id: event_id,
        properties,
    }))
}

fn event_properties(event: &CanonicalEvent) -> Result<FieldMap, StorageError> {
    let encode = |value: serde_json::Result<String>| {
        value.map_err(|e| StorageError::Transaction(format!("cannot encode event: {e}")))
    };

    let mut props = FieldMap::new();
    props.insert("class_uid".into(), event.class_uid.as_str().into());
    if let Some(category) = &event.category_uid {
        props.insert("category_uid".into(), category.as_str().into());
    }
    props.insert("time".into(), rfc3339(event).into());
    if let Some(severity) = event.severity {
        props.insert("severity".into(), i64::from(severity.value()).into());
    }
    if let Some(message) = &event.message {
        props.insert("message".into(), message.as_str().into());
    }
    props.insert(
        "metadata".into(),
        encode(serde_json::to_string(&event.metadata))?.into(),
    );
    if !event.extensions.is_empty() {
        props.insert(
            "extensions".into(),
            encode(serde_json::to_string(&event.extensions))?.into(),
        );
    }
    Ok(props)
}

fn endpoint_keys(endpoint: &Endpoint) -> Vec<NodeKey> {
    let mut keys = Vec::new();
    if let Some(ip) = endpoint.ip {
        keys.push(NodeKey::new(NodeLabel::Ip, ip.to_string()));
    }
    if let Some(host) = endpoint.hostname.as_deref().filter(|h| !h.trim().is_empty()) {
        keys.push(NodeKey::new(NodeLabel::Host, host.trim().to_lowercase()));
    }
    keys
}

fn endpoint_properties(endpoint: &Endpoint) -> FieldMap {
    let mut props = FieldMap::new();
    if let Some(ip) = endpoint.ip {
        props.insert("ip".into(), ip.to_string().into());
    }
    if let Some(host) = &endpoint.hostname {
        props.insert("hostname".into(), host.as_str().into());
    }
    if let Some(id) = &endpoint.id {
        props.insert("id".into(), id.as_str().into());
    }
    props
}

/// `name@domain` (소문자), 도메인이 없으면 `name`
fn user_key(name: &str, domain: Option<&str>) -> String {
    match domain.map(str::trim).filter(|d| !d.is_empty()) {
        Some(domain) => format!("{}@{}", name.trim(), domain).to_lowercase(),
        None => name.trim().to_lowercase(),
    }
}

fn resource_node(resource: &Resource) -> Option<(NodeKey, FieldMap)> {
    let label = match resource.kind.as_deref().map(str::trim) {
        Some(kind) if kind.eq_ignore_ascii_case("process") => NodeLabel::Process,
        Some(kind) if kind.eq_ignore_ascii_case("host") => NodeLabel::Host,
        Some(kind) if kind.eq_ignore_ascii_case("ip") => NodeLabel::Ip,
        Some(kind) if kind.eq_ignore_ascii_case("user") => NodeLabel::User,
        _ => NodeLabel::Resource,
    };
    let raw_key = [&resource.id, &resource.path, &resource.name]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())?;
    let key = match label {
        NodeLabel::Host => raw_key.to_lowercase(),
        NodeLabel::User => user_key(raw_key, None),
        NodeLabel::Ip => raw_key
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| raw_key.to_owned()),
        _ => raw_key.to_owned(),
    };

    let mut props = FieldMap::new();
    for (name, value) in [
        ("id", &resource.id),
        ("type", &resource.kind),
        ("name", &resource.name),
        ("path", &resource.path),
    ] {
        if let Some(value) = value {
            props.insert(name.into(), value.as_str().into());
        }
    }
    Some((NodeKey::new(label, key), props))
}

#[derive(Clone, Copy)]
enum Direction {
    Generated,
    Performed,
    Targets,
}

struct WriteSetBuilder {
    event: NodeKey,
    time: String,
    entities: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl WriteSetBuilder {
    fn new(event: NodeKey, time: String) -> Self {
        Self {
            event,
            time,
            entities: Vec::new(),
            relationships: Vec::new(),
        }
    }

    fn link(&mut self, direction: Direction, entity: NodeKey, properties: FieldMap) {
        match self.entities.iter_mut().find(|n| n.id == entity) {
            Some(existing) => existing.properties.extend(properties),
            None => self.entities.push(Node {
                id: entity.clone(),
                properties,
            }),
        }

        let key = match direction {
            Direction::Generated => RelKey {
                from: entity,
                rel: RelType::Generated,
                to: self.event.clone(),
            },
            Direction::Performed => RelKey {
                from: entity,
                rel: RelType::Performed,
                to: self.event.clone(),
            },
            Direction::Targets => RelKey {
                from: self.event.clone(),
                rel: RelType::Targets,
                to: entity,
            },
        };
        if self.relationships.iter().any(|r| r.key == key) {
            return;
        }
        let mut properties = FieldMap::new();
        properties.insert("time".into(), self.time.as_str().into());
        self.relationships.push(Relationship { key, properties });
    }

    fn finish(self, event: Node) -> WriteSet {
        WriteSet {
            event,
            entities: self.entities,
            relationships: self.relationships,
        }
    }
}
