// # DNS Record Cache
//
// Maps logical names (subdomain only, base domain stripped) to the last
// observed remote record. The cache exists to suppress redundant remote
// writes: if the remote record's `modified_on` still matches what we last
// observed, nothing changed and no update is issued.
//
// ## Consistency
//
// The key set is always a subset of what is believed to exist remotely.
// A miss never implies remote absence; the engine confirms with an
// authoritative lookup before any create.

use std::collections::HashMap;

use crate::traits::DnsRecord;

/// In-memory DNS record cache keyed by logical name
#[derive(Debug, Default)]
pub struct DnsRecordCache {
    records: HashMap<String, DnsRecord>,
}

impl DnsRecordCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache from a full zone listing
    ///
    /// Only records under `domain` are kept; their key is the name with the
    /// `.{domain}` suffix stripped. Records outside the domain (or the apex
    /// itself) are ignored. Returns the number of records cached.
    pub fn hydrate(&mut self, records: Vec<DnsRecord>, domain: &str) -> usize {
        let suffix = format!(".{domain}");
        self.records.clear();
        for record in records {
            if let Some(logical) = record.name.strip_suffix(&suffix) {
                self.records.insert(logical.to_string(), record);
            }
        }
        self.records.len()
    }

    /// Last observed record for a logical name
    pub fn get(&self, logical: &str) -> Option<&DnsRecord> {
        self.records.get(logical)
    }

    /// Record the server's view of a record after a create or update
    pub fn insert(&mut self, logical: &str, record: DnsRecord) {
        self.records.insert(logical.to_string(), record);
    }

    /// Drop a logical name after a delete (or confirmed remote absence)
    pub fn remove(&mut self, logical: &str) -> Option<DnsRecord> {
        self.records.remove(logical)
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
