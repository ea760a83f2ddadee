//! Proptest strategies for records and payloads.

use proptest::prelude::*;

use weft_core::{Collection, Guid, Payload, Record, TabEntry, Visit};

/// A valid GUID derived deterministically from nine bytes.
pub fn guid() -> impl Strategy<Value = Guid> {
    any::<[u8; 9]>().prop_map(|bytes| {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        Guid::from(URL_SAFE_NO_PAD.encode(bytes).as_str())
    })
}

fn url() -> impl Strategy<Value = String> {
    "[a-z]{3,12}".prop_map(|host| format!("https://{host}.example.com/"))
}

fn title() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{0,40}"
}

pub fn history_payload() -> impl Strategy<Value = Payload> {
    (
        url(),
        title(),
        proptest::collection::vec((0i64..2_000_000_000_000i64, 1u32..8), 0..5),
    )
        .prop_map(|(hist_uri, title, visits)| Payload::History {
            hist_uri,
            title,
            visits: visits
                .into_iter()
                .map(|(date, transition)| Visit { date, transition })
                .collect(),
        })
}

pub fn password_payload() -> impl Strategy<Value = Payload> {
    (url(), "[a-z]{1,16}", "[ -~]{1,32}").prop_map(|(hostname, username, password)| {
        Payload::Password {
            hostname,
            form_submit_url: None,
            username,
            password,
            username_field: String::new(),
            password_field: String::new(),
        }
    })
}

pub fn tabs_payload() -> impl Strategy<Value = Payload> {
    (
        "[A-Za-z ]{1,20}",
        proptest::collection::vec((title(), url(), 0i64..2_000_000_000_000i64), 0..4),
    )
        .prop_map(|(client_name, tabs)| Payload::Tabs {
            client_name,
            tabs: tabs
                .into_iter()
                .map(|(title, url, last_used)| TabEntry {
                    title,
                    url_history: vec![url],
                    icon: None,
                    last_used,
                })
                .collect(),
        })
}

pub fn bookmark_payload() -> impl Strategy<Value = Payload> {
    (
        title(),
        url(),
        proptest::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(|(title, bmk_uri, tags)| Payload::Bookmark {
            title,
            bmk_uri,
            description: None,
            tags,
            parent_id: None,
            parent_name: None,
        })
}

/// Any payload from any collection.
pub fn payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        history_payload(),
        password_payload(),
        tabs_payload(),
        bookmark_payload(),
    ]
}

/// A live record or a tombstone; always structurally valid.
pub fn record() -> impl Strategy<Value = Record> {
    prop_oneof![
        4 => (guid(), payload()).prop_map(|(guid, payload)| Record::new(guid, payload)),
        1 => (guid(), any::<u8>()).prop_map(|(guid, pick)| {
            let order = Collection::SYNC_ORDER;
            Record::tombstone(guid, order[usize::from(pick) % order.len()])
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_crypto::{CryptoRecord, KeyBundle};

    proptest! {
        #[test]
        fn generated_records_are_valid(record in record()) {
            prop_assert!(record.validate().is_ok());
        }

        #[test]
        fn any_record_survives_seal_and_open(record in record()) {
            let bundle = KeyBundle::generate();
            let sealed = CryptoRecord::seal(&record, &bundle).unwrap();
            let opened = sealed.open(record.collection, &bundle).unwrap();
            prop_assert_eq!(opened.guid, record.guid);
            prop_assert_eq!(opened.deleted, record.deleted);
            prop_assert_eq!(opened.payload, record.payload);
        }
    }
}
