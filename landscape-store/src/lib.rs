//! The durable, append-only queue of outbound messages: sequence,
//! pending offset, server sequence, accepted-types with live hold
//! semantics, and a bucketed on-disk message layout. See spec §4.3.

mod disk;
mod error;
mod json;
mod message;

pub use error::{Result, StoreError};
pub use message::Message;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use landscape_persist::{Persist, PersistValue, PersistView};
use landscape_schema::{SchemaRegistry, Value};

/// Tuning knobs for a [`MessageStore`].
#[derive(Debug, Clone)]
pub struct MessageStoreConfig {
    /// Directory messages are bucketed under.
    pub directory: PathBuf,
    /// Messages per bucket directory (§4.3a; historically 1000).
    pub messages_per_directory: u64,
    /// Schema-version string stamped onto messages that don't carry
    /// their own `api` field.
    pub default_api: String,
}

impl MessageStoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        MessageStoreConfig {
            directory: directory.into(),
            messages_per_directory: 1000,
            default_api: "3.3".to_string(),
        }
    }
}

/// A cheap handle: every field is itself a clonable handle (the
/// underlying persisted tree and schema registry are shared), so
/// `RegistrationHandler` and `MessageExchange` can each hold their own
/// clone of the same store.
#[derive(Clone)]
pub struct MessageStore {
    persist: PersistView,
    registry: SchemaRegistry,
    directory: PathBuf,
    messages_per_directory: u64,
    default_api: String,
}

impl MessageStore {
    pub fn new(persist: &Persist, registry: SchemaRegistry, config: MessageStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(|source| StoreError::CreateDir {
            path: config.directory.clone(),
            source,
        })?;
        Ok(MessageStore {
            persist: persist.root_at("message-store"),
            registry,
            directory: config.directory,
            messages_per_directory: config.messages_per_directory,
            default_api: config.default_api,
        })
    }

    pub fn get_sequence(&self) -> u64 {
        self.persist.get("sequence").and_then(|v| v.as_int()).unwrap_or(0) as u64
    }

    pub fn set_sequence(&self, sequence: u64) {
        self.persist.set("sequence", sequence as i64);
    }

    pub fn get_server_sequence(&self) -> u64 {
        self.persist.get("server-sequence").and_then(|v| v.as_int()).unwrap_or(0) as u64
    }

    pub fn set_server_sequence(&self, sequence: u64) {
        self.persist.set("server-sequence", sequence as i64);
    }

    pub fn get_pending_offset(&self) -> u64 {
        self.persist.get("pending-offset").and_then(|v| v.as_int()).unwrap_or(0) as u64
    }

    pub fn set_pending_offset(&self, offset: u64) {
        self.persist.set("pending-offset", offset as i64);
    }

    pub fn add_pending_offset(&self, n: u64) {
        self.set_pending_offset(self.get_pending_offset() + n);
    }

    pub fn get_api(&self) -> String {
        self.persist
            .get("api")
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_else(|| self.default_api.clone())
    }

    pub fn set_api(&self, api: impl Into<String>) {
        self.persist.set("api", api.into());
    }

    pub fn get_accepted_types(&self) -> BTreeSet<String> {
        self.persist
            .get("accepted-types")
            .and_then(|v| {
                v.as_list().map(|items| {
                    items.iter().filter_map(|item| item.as_text().map(str::to_string)).collect()
                })
            })
            .unwrap_or_default()
    }

    /// Replace the accepted-type set. Idempotent: calling it twice with
    /// the same set leaves the persisted tree byte-identical. Messages
    /// of a type that just left the set become held (filtered out of
    /// `get_pending_messages`/`count_pending_messages`) the moment this
    /// returns; no separate per-message bit is stored, since whether a
    /// message is held is a pure function of its type and the current
    /// accepted set (see DESIGN.md).
    pub fn set_accepted_types(&self, types: impl IntoIterator<Item = impl Into<String>>) {
        let sorted: BTreeSet<String> = types.into_iter().map(Into::into).collect();
        let list = PersistValue::List(sorted.into_iter().map(PersistValue::Text).collect());
        self.persist.set("accepted-types", list);
    }

    pub fn accepts(&self, message_type: &str) -> bool {
        self.get_accepted_types().contains(message_type)
    }

    /// 16-byte MD5 digest of the sorted, semicolon-joined accepted-type
    /// list, sent with every payload so the server can detect drift.
    pub fn get_accepted_types_digest(&self) -> [u8; 16] {
        let joined = self.get_accepted_types().into_iter().collect::<Vec<_>>().join(";");
        md5::compute(joined.as_bytes()).0
    }

    /// The absolute id boundary below which an *accepted-type* message is
    /// guaranteed to have already been sent: `sequence + pending_offset`.
    /// Held messages don't obey this boundary -- they can sit at any id,
    /// since `next_id()` hands out ids to held and accepted messages
    /// alike while `sequence` only ever counts accepted messages that
    /// were actually transmitted. Only `delete_old_messages` uses this as
    /// a cutoff, and only after checking a message is currently accepted;
    /// `pending_all` relies on `confirm_delivered` having already removed
    /// anything truly sent, so it needs no id comparison at all.
    fn commit_point(&self) -> u64 {
        self.get_sequence() + self.get_pending_offset()
    }

    fn next_id(&self) -> u64 {
        let id = self.persist.get("next-id").and_then(|v| v.as_int()).unwrap_or(0) as u64;
        self.persist.set("next-id", (id + 1) as i64);
        id
    }

    /// Coerce `value` against the schema registered for its `type`,
    /// inject `timestamp`/`api` if absent, assign a stable id, and write
    /// it to disk. No state changes on failure.
    pub fn add(&self, value: Value) -> Result<u64> {
        let message_type = value
            .as_map()
            .and_then(|m| m.get("type"))
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or(StoreError::MissingType)?;

        let mut coerced = self.registry.coerce(&message_type, &value)?;
        if let Value::Map(map) = &mut coerced {
            map.entry("timestamp".to_string()).or_insert_with(|| Value::Float(now_seconds()));
            map.entry("api".to_string()).or_insert_with(|| Value::Text(self.get_api()));
        }

        let id = self.next_id();
        disk::write_message(&self.directory, id, self.messages_per_directory, &coerced)?;
        Ok(id)
    }

    /// Every on-disk message whose type is currently accepted, ordered by
    /// id. Corrupt files are skipped. A message still on disk has, by
    /// construction, never been confirmed delivered -- `confirm_delivered`
    /// removes a message the moment the server acknowledges it, so
    /// existence alone (plus the accepted-types filter) is enough; no id
    /// cutoff is needed, and none is applied, since held messages can
    /// carry an id below any such cutoff without ever having been sent.
    fn pending_all(&self) -> Vec<Message> {
        let accepted = self.get_accepted_types();
        disk::list_message_ids(&self.directory)
            .into_iter()
            .filter_map(|id| {
                let path = disk::message_path(&self.directory, id, self.messages_per_directory);
                let value = disk::read_message(&path)?;
                let message_type = value.as_map()?.get("type")?.as_text()?.to_string();
                accepted.contains(&message_type).then_some(Message { id, value })
            })
            .collect()
    }

    pub fn count_pending_messages(&self) -> usize {
        self.pending_all().len()
    }

    /// The next `max` non-held messages still awaiting delivery, further
    /// trimmed to the longest prefix that shares the `api` of the first
    /// returned message (§4.4's tie-break; a missing `api` means "the
    /// earliest schema version" and is its own bucket).
    pub fn get_pending_messages(&self, max: Option<usize>) -> Vec<Message> {
        let mut result = Vec::new();
        let mut batch_api: Option<String> = None;

        for message in self.pending_all() {
            if let Some(max) = max {
                if result.len() >= max {
                    break;
                }
            }
            let api = message.api().unwrap_or_default().to_string();
            match &batch_api {
                None => batch_api = Some(api),
                Some(first) if *first != api => break,
                _ => {}
            }
            result.push(message);
        }
        result
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending_all().iter().any(|m| m.id == id)
    }

    /// Wipe every on-disk message. Used on re-registration; the
    /// sequence/offset counters are left untouched (the caller resets
    /// them explicitly if the new registration demands a clean slate).
    pub fn delete_all_messages(&self) {
        disk::remove_all(&self.directory);
    }

    /// Remove every on-disk message below the commit point whose type is
    /// currently accepted. A held message at or below the cutoff is left
    /// alone: it was never part of what `sequence` counted, so it must
    /// "rejoin the pending stream when the type becomes accepted again"
    /// (§3), and this is the housekeeping sweep §4.3 says must "never
    /// touch held messages." A file that fails to deserialize is removed
    /// -- corruption is already treated as absence everywhere else.
    pub fn delete_old_messages(&self) {
        let cutoff = self.commit_point();
        let accepted = self.get_accepted_types();
        for id in disk::list_message_ids(&self.directory) {
            if id >= cutoff {
                break;
            }
            let path = disk::message_path(&self.directory, id, self.messages_per_directory);
            let held = disk::read_message(&path)
                .and_then(|value| value.as_map()?.get("type")?.as_text().map(str::to_string))
                .is_some_and(|message_type| !accepted.contains(&message_type));
            if held {
                continue;
            }
            disk::remove_message(&self.directory, id, self.messages_per_directory);
        }
    }

    /// Remove exactly the given ids: the server has acknowledged them, so
    /// they're delivered regardless of whether their type is still
    /// accepted. Used by the exchange to retire the precise messages a
    /// response confirmed, since a response only ever confirms a prefix
    /// of what was actually sent -- deriving that prefix from `sequence`
    /// arithmetic alone breaks as soon as held messages leave gaps in
    /// id-space (see DESIGN.md).
    pub fn confirm_delivered(&self, ids: &[u64]) {
        for &id in ids {
            disk::remove_message(&self.directory, id, self.messages_per_directory);
        }
    }

    /// Persist sequence/offset/accepted-types/api metadata to disk.
    pub fn commit(&self) -> Result<()> {
        self.persist.save()?;
        Ok(())
    }
}

fn now_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use landscape_schema::Schema;
    use pretty_assertions::assert_eq;

    fn store_with_schema(dir: &std::path::Path) -> MessageStore {
        let mut registry = SchemaRegistry::new();
        registry.add_schema("empty", Schema::message("empty", [], []));
        registry.add_schema(
            "counted",
            Schema::message("counted", [("n".to_string(), Schema::Int)], []),
        );
        registry.add_schema("held", Schema::message("held", [], []));

        let persist = Persist::new();
        MessageStore::new(&persist, registry, MessageStoreConfig::new(dir)).unwrap()
    }

    fn message(message_type: &str) -> Value {
        Value::map([("type".to_string(), Value::Text(message_type.to_string()))])
    }

    #[test]
    fn add_then_get_pending_returns_the_message_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);

        let id = store.add(message("empty")).unwrap();
        let pending = store.get_pending_messages(None);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(store.count_pending_messages(), 1);
    }

    #[test]
    fn unaccepted_type_is_held_until_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        // accepted types empty: nothing is sendable yet.
        store.add(message("empty")).unwrap();

        assert!(store.get_pending_messages(None).is_empty());
        assert_eq!(store.count_pending_messages(), 0);

        store.set_accepted_types(["empty"]);
        assert_eq!(store.get_pending_messages(None).len(), 1);
    }

    #[test]
    fn add_injects_timestamp_and_api() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);
        store.add(message("empty")).unwrap();

        let pending = store.get_pending_messages(None);
        assert!(pending[0].timestamp().is_some());
        assert_eq!(pending[0].api(), Some("3.3"));
    }

    #[test]
    fn rejects_messages_that_fail_schema_coercion() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        let bad = Value::map([
            ("type".to_string(), Value::Text("counted".to_string())),
            ("n".to_string(), Value::Text("not a number".to_string())),
        ]);

        assert!(store.add(bad).is_err());
        assert_eq!(store.count_pending_messages(), 0);
    }

    #[test]
    fn full_successful_exchange_advances_sequence_and_frees_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);
        for _ in 0..3 {
            store.add(message("empty")).unwrap();
        }

        let old = store.get_sequence();
        let batch = store.get_pending_messages(None);
        assert_eq!(batch.len(), 3);

        // simulate a full accept
        store.set_sequence(old + batch.len() as u64);
        store.set_pending_offset(0);
        store.delete_old_messages();

        assert_eq!(store.get_sequence(), 3);
        assert!(store.get_pending_messages(None).is_empty());
    }

    #[test]
    fn held_message_below_the_commit_point_survives_a_full_accept_and_reappears_once_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);

        // "held" gets the lower id but is never accepted, so it's never
        // sent; "empty" gets the higher id and is the only thing in the
        // batch.
        let held_id = store.add(message("held")).unwrap();
        store.add(message("empty")).unwrap();

        let old = store.get_sequence();
        let batch = store.get_pending_messages(None);
        assert_eq!(batch.len(), 1, "the held message must not be part of the sent batch");

        // Simulate a full accept of that one-message batch.
        store.set_sequence(old + batch.len() as u64);
        store.set_pending_offset(0);
        store.confirm_delivered(&batch.iter().map(|m| m.id).collect::<Vec<_>>());
        store.delete_old_messages();

        assert!(!store.is_pending(held_id), "still held, so not yet pending again");
        let on_disk = disk::message_path(dir.path(), held_id, store.messages_per_directory);
        assert!(
            std::fs::read(&on_disk).is_ok(),
            "delete_old_messages must never remove a held message"
        );

        store.set_accepted_types(["empty", "held"]);
        let pending = store.get_pending_messages(None);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, held_id, "the held message rejoins the pending stream once accepted");
    }

    #[test]
    fn corruption_tolerance_skips_one_bad_file_and_returns_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);
        let first = store.add(message("empty")).unwrap();
        let _second = store.add(message("empty")).unwrap();

        let bad_path = disk::message_path(dir.path(), first, store.messages_per_directory);
        std::fs::write(&bad_path, b"not json at all").unwrap();

        let pending = store.get_pending_messages(None);
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id, first);
    }

    #[test]
    fn accepted_types_digest_is_stable_and_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["b", "a"]);
        let first = store.get_accepted_types_digest();
        store.set_accepted_types(["a", "b"]);
        assert_eq!(first, store.get_accepted_types_digest());
    }

    #[test]
    fn api_tie_break_keeps_only_the_longest_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);
        store.add(message("empty")).unwrap();
        store.add(message("empty")).unwrap();
        store.set_api("9.9");
        store.add(message("empty")).unwrap();

        let pending = store.get_pending_messages(None);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|m| m.api() == Some("3.3")));
    }

    #[test]
    fn delete_all_messages_wipes_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_schema(dir.path());
        store.set_accepted_types(["empty"]);
        store.add(message("empty")).unwrap();

        store.delete_all_messages();
        assert_eq!(store.count_pending_messages(), 0);
    }
}
