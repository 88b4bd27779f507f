//! LEEF 매핑

use graphwarden_core::types::FieldMap;

use super::{Draft, take_first, take_text};

pub(super) fn map(mut fields: FieldMap, draft: &mut Draft) {
    draft.set("class_uid", "0001");
    draft.set("category_uid", "0002");

    let time_format = take_text(&mut fields, "devTimeFormat");
    draft.set_time(
        take_first(&mut fields, &["devTime", "devtime"]),
        time_format.as_deref(),
    );

    draft.set_ip("src.ip", "src", fields.remove("src"));
    draft.set_port("src.port", "srcPort", fields.remove("srcPort"));
    draft.set_text("src.hostname", "identHostName", fields.remove("identHostName"));
    draft.set_ip("dst.ip", "dst", fields.remove("dst"));
    draft.set_port("dst.port", "dstPort", fields.remove("dstPort"));

    draft.set_text("principal.name", "usrName", fields.remove("usrName"));
    draft.set_text("principal.domain", "domain", fields.remove("domain"));

    draft.set_severity(fields.remove("sev"));
    draft.set_text_first("message", &mut fields, &["msg", "message"]);

    draft.set_text_first("metadata.product.name", &mut fields, &["product", "devname"]);
    draft.set_text_first("metadata.vendor_name", &mut fields, &["vendor", "devtype"]);
    draft.set_text("metadata.product.version", "version", fields.remove("version"));

    if let Some(event_id) = fields.remove("eventId") {
        draft.extension("event_id", event_id);
    }

    draft.extend(fields);
}
