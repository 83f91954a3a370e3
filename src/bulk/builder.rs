use crate::client::{BulkRequest, Operation};

/// Ordered accumulator of operations for one `bulk` request.
///
/// Every appended operation may be attributed to the file it came from so a
/// failing index reported by the server can be traced back to that file.
#[derive(Debug, Clone, Default)]
pub struct BulkBuilder {
    operations: Vec<Operation>,
    files: Vec<Option<String>>,
}

impl BulkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all operations and their attributions.
    pub fn reset(&mut self) {
        self.operations.clear();
        self.files.clear();
    }

    /// Append one operation originating from `file`.
    pub fn append(&mut self, operation: Operation, file: impl Into<String>) {
        self.operations.push(operation);
        self.files.push(Some(file.into()));
    }

    /// Append an operation that belongs to no file (bookkeeping).
    pub fn append_unattributed(&mut self, operation: Operation) {
        self.operations.push(operation);
        self.files.push(None);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The file the operation at `index` was appended for.
    pub fn file_for(&self, index: usize) -> Option<&str> {
        self.files.get(index).and_then(|f| f.as_deref())
    }

    /// Split into consecutive runs of operations sharing the same `key`,
    /// keeping order and file attribution. Indexes restart in every run.
    pub fn split_by<K: PartialEq>(self, key: impl Fn(&Operation) -> K) -> Vec<(K, BulkBuilder)> {
        let mut runs: Vec<(K, BulkBuilder)> = Vec::new();
        for (operation, file) in self.operations.into_iter().zip(self.files) {
            let k = key(&operation);
            match runs.last_mut() {
                Some((last, run)) if *last == k => {
                    run.operations.push(operation);
                    run.files.push(file);
                }
                _ => runs.push((
                    k,
                    BulkBuilder {
                        operations: vec![operation],
                        files: vec![file],
                    },
                )),
            }
        }
        runs
    }

    /// The `bulk` request body, operations in append order.
    pub fn to_request(&self) -> BulkRequest<'_> {
        BulkRequest {
            kind: "bulk",
            source: None,
            args: &self.operations,
        }
    }

    /// The `bulk` request body for `v2/query`, which requires a source.
    pub fn to_source_request<'a>(&'a self, source: &'a str) -> BulkRequest<'a> {
        BulkRequest {
            kind: "bulk",
            source: Some(source),
            args: &self.operations,
        }
    }
}
