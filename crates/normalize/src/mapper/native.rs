//! 네이티브 JSON 매핑
//!
//! 정규 키는 그대로 복사하고 OCSF 별칭(`src_endpoint`, `dst_endpoint`, `actor.user`)을
//! 정규 위치로 옮깁니다. 정규 객체 안의 알 수 없는 하위 키는 `extensions[<객체명>]`에 보존됩니다.

use graphwarden_core::types::{FieldMap, FieldValue};

use super::Draft;

const ENDPOINT_KEYS: [&str; 5] = ["id", "type", "ip", "hostname", "port"];
const PRINCIPAL_KEYS: [&str; 4] = ["id", "type", "name", "domain"];
const METADATA_KEYS: [&str; 4] = ["version", "product", "vendor_name", "uid"];
const PRODUCT_KEYS: [&str; 3] = ["name", "version", "vendor_name"];

pub(super) fn map(mut fields: FieldMap, draft: &mut Draft) {
    for key in ["class_uid", "category_uid"] {
        if let Some(value) = fields.remove(key) {
            match value {
                FieldValue::Integer(n) => draft.set(key, n.to_string()),
                other => draft.set_raw(key, other),
            }
        }
    }

    draft.set_time(fields.remove("time"), None);
    draft.set_severity(fields.remove("severity"));
    if let Some(message) = fields.remove("message") {
        draft.set_raw("message", message);
    }

    if let Some(metadata) = fields.remove("metadata") {
        map_metadata(metadata, draft);
    }

    for (canonical, alias) in [("src", "src_endpoint"), ("dst", "dst_endpoint")] {
        let value = match fields.remove(canonical) {
            Some(value) => {
                keep_alias(&mut fields, alias, draft);
                Some(value)
            }
            None => fields.remove(alias),
        };
        if let Some(value) = value {
            map_object(canonical, value, &ENDPOINT_KEYS, draft);
        }
    }

    let principal = match fields.remove("principal") {
        Some(value) => Some(value),
        None => take_actor_user(&mut fields),
    };
    if let Some(value) = principal {
        map_object("principal", value, &PRINCIPAL_KEYS, draft);
    }

    if let Some(resources) = fields.remove("resources") {
        draft.push_raw_resources(resources);
    }

    if let Some(extensions) = fields.remove("extensions") {
        match extensions {
            FieldValue::Map(map) => draft.extend(map),
            other => draft.extension("extensions", other),
        }
    }

    draft.extend(fields);
}

/// 정규 키와 별칭이 모두 있으면 별칭은 확장 필드로 보존합니다.
fn keep_alias(fields: &mut FieldMap, alias: &str, draft: &mut Draft) {
    if let Some(value) = fields.remove(alias) {
        draft.extension(alias, value);
    }
}

/// `actor.user`를 꺼냅니다. `actor`의 나머지 키는 그대로 남깁니다.
fn take_actor_user(fields: &mut FieldMap) -> Option<FieldValue> {
    let Some(FieldValue::Map(actor)) = fields.get_mut("actor") else {
        return None;
    };
    let user = actor.remove("user");
    if actor.is_empty() {
        fields.remove("actor");
    }
    user
}

fn map_metadata(value: FieldValue, draft: &mut Draft) {
    let FieldValue::Map(metadata) = value else {
        draft.set_raw("metadata", value);
        return;
    };
    let (mut known, unknown) = split_known(metadata, &METADATA_KEYS);
    let product = known.remove("product");
    for (key, value) in known {
        draft.set_raw(&format!("metadata.{key}"), value);
    }

    match product {
        Some(FieldValue::Map(product)) => {
            let (mut product, product_unknown) = split_known(product, &PRODUCT_KEYS);
            if let Some(vendor) = product.remove("vendor_name") {
                if draft.has("metadata.vendor_name") {
                    draft.extension("metadata.product.vendor_name", vendor);
                } else {
                    draft.set_raw("metadata.vendor_name", vendor);
                }
            }
            draft.set("metadata.product", serde_json::Value::Object(Default::default()));
            for (key, value) in product {
                draft.set_raw(&format!("metadata.product.{key}"), value);
            }
            if !product_unknown.is_empty() {
                draft.extension("metadata.product", FieldValue::Map(product_unknown));
            }
        }
        Some(other) => draft.set_raw("metadata.product", other),
        None => {}
    }

    if !unknown.is_empty() {
        draft.extension("metadata", FieldValue::Map(unknown));
    }
}

/// 정규 객체(`src`, `dst`, `principal`)를 복사합니다.
fn map_object(name: &str, value: FieldValue, known_keys: &[&str], draft: &mut Draft) {
    let FieldValue::Map(map) = value else {
        draft.set_raw(name, value);
        return;
    };
    let (known, unknown) = split_known(map, known_keys);
    draft.set(name, serde_json::Value::Object(Default::default()));
    for (key, value) in known {
        let path = format!("{name}.{key}");
        match (key.as_str(), value.as_i64()) {
            ("port", Some(port)) => draft.set(&path, port),
            _ => draft.set_raw(&path, value),
        }
    }
    if !unknown.is_empty() {
        draft.extension(name, FieldValue::Map(unknown));
    }
}

fn split_known(map: FieldMap, known_keys: &[&str]) -> (FieldMap, FieldMap) {
    map.into_iter()
        .partition(|(key, _)| known_keys.contains(&key.as_str()))
}
