//! Full-text tool index with atomic per-server differential sync (§4.4).

mod schema;

pub use schema::ToolSchema;

use crate::error::CoreError;
use crate::hash::RapidHash;
use crate::types::{ToolDocument, ToolInfo};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, RegexQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};
use tokio::sync::Mutex as AsyncMutex;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Outcome of syncing one server's discovered tool set into the index.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub deleted: usize,
    pub upserted: usize,
    pub failed_ids: Vec<String>,
}

struct PerServerLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PerServerLocks {
    fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn get(&self, server: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(server.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub struct ToolIndex {
    schema: ToolSchema,
    index: Index,
    reader: IndexReader,
    writer: AsyncMutex<IndexWriter>,
    server_locks: PerServerLocks,
    // Last-synced hashes per server, used to compute the differential sync
    // without depending on reader reload timing (§4.4 step 1-2).
    synced: SyncMutex<HashMap<String, HashMap<String, RapidHash>>>,
}

impl ToolIndex {
    pub fn new_in_ram() -> Result<Self, CoreError> {
        let schema = ToolSchema::build();
        let index = Index::create_in_ram(schema.schema.clone());
        Self::from_index(schema, index)
    }

    fn from_index(schema: ToolSchema, index: Index) -> Result<Self, CoreError> {
        let writer = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            schema,
            index,
            reader,
            writer: AsyncMutex::new(writer),
            server_locks: PerServerLocks::new(),
            synced: SyncMutex::new(HashMap::new()),
        })
    }

    pub fn get_document_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    pub async fn index_tool(&self, server_name: &str, info: &ToolInfo) -> Result<(), CoreError> {
        self.batch_index(server_name, std::slice::from_ref(info)).await
    }

    pub async fn batch_index(
        &self,
        server_name: &str,
        infos: &[ToolInfo],
    ) -> Result<(), CoreError> {
        let mut writer = self.writer.lock().await;
        for info in infos {
            let doc_rec = ToolDocument::from_tool_info(server_name, info);
            self.delete_doc_unlocked(&mut writer, &doc_rec.full_tool_name);
            writer.add_document(self.to_tantivy_doc(&doc_rec))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub async fn delete_tool(&self, server_name: &str, tool_name: &str) -> Result<(), CoreError> {
        let full_id = format!("{server_name}:{tool_name}");
        let mut writer = self.writer.lock().await;
        self.delete_doc_unlocked(&mut writer, &full_id);
        writer.commit()?;
        self.reader.reload()?;
        let mut synced = self.synced.lock();
        if let Some(entry) = synced.get_mut(server_name) {
            entry.remove(tool_name);
        }
        Ok(())
    }

    pub async fn delete_server_tools(&self, server_name: &str) -> Result<(), CoreError> {
        let mut writer = self.writer.lock().await;
        let term = Term::from_field_text(self.schema.server_name, server_name);
        writer.delete_term(term);
        writer.commit()?;
        self.reader.reload()?;
        self.synced.lock().remove(server_name);
        Ok(())
    }

    /// Differential per-server sync (§4.4): after this call exactly the ids
    /// in `desired` are present for `server_name` (I2).
    pub async fn sync_server(
        &self,
        server_name: &str,
        desired: &[ToolInfo],
    ) -> Result<SyncReport, CoreError> {
        let lock = self.server_locks.get(server_name);
        let _guard = lock.lock().await;

        let existing = self
            .synced
            .lock()
            .get(server_name)
            .cloned()
            .unwrap_or_default();

        let desired_names: std::collections::HashSet<&str> =
            desired.iter().map(|t| t.name.as_str()).collect();
        let to_delete: Vec<String> = existing
            .keys()
            .filter(|name| !desired_names.contains(name.as_str()))
            .cloned()
            .collect();
        let to_upsert: Vec<&ToolInfo> = desired
            .iter()
            .filter(|t| {
                existing
                    .get(&t.name)
                    .map(|h| *h != t.schema_hash(server_name))
                    .unwrap_or(true)
            })
            .collect();

        let mut report = SyncReport::default();
        {
            let mut writer = self.writer.lock().await;
            for name in &to_delete {
                let full_id = format!("{server_name}:{name}");
                self.delete_doc_unlocked(&mut writer, &full_id);
                report.deleted += 1;
            }
            for info in &to_upsert {
                let doc_rec = ToolDocument::from_tool_info(server_name, info);
                self.delete_doc_unlocked(&mut writer, &doc_rec.full_tool_name);
                match writer.add_document(self.to_tantivy_doc(&doc_rec)) {
                    Ok(_) => report.upserted += 1,
                    Err(err) => {
                        log::error!("ToolIndex: failed to index {}: {err}", doc_rec.doc_id());
                        report.failed_ids.push(doc_rec.doc_id());
                    }
                }
            }
            writer.commit()?;
        }
        self.reader.reload()?;

        let mut new_synced: HashMap<String, RapidHash> = existing
            .into_iter()
            .filter(|(name, _)| !to_delete.contains(name))
            .collect();
        for info in &to_upsert {
            new_synced.insert(info.name.clone(), info.schema_hash(server_name));
        }
        self.synced.lock().insert(server_name.to_string(), new_synced);

        Ok(report)
    }

    pub fn get_tools_by_server(&self, server_name: &str) -> Result<Vec<ToolDocument>, CoreError> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.schema.server_name, server_name);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let hits = searcher.search(&query, &TopDocs::with_limit(10_000))?;
        let mut results = Vec::with_capacity(hits.len());
        for (_score, addr) in hits {
            let doc: TantivyDocument = searcher.doc(addr)?;
            results.push(self.from_tantivy_doc(&doc));
        }
        Ok(results)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(ToolDocument, f32)>, CoreError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidConfig("search query must not be empty".to_string()));
        }

        let searcher = self.reader.searcher();
        let composed = self.build_query(trimmed)?;
        let hits = searcher.search(&composed, &TopDocs::with_limit(limit))?;
        let mut results = Vec::with_capacity(hits.len());
        for (score, addr) in hits {
            let doc: TantivyDocument = searcher.doc(addr)?;
            results.push((self.from_tantivy_doc(&doc), score));
        }
        Ok(results)
    }

    fn build_query(&self, query: &str) -> Result<Box<dyn Query>, CoreError> {
        let escaped = regex::escape(query);
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let exact_tool_name = TermQuery::new(
            Term::from_field_text(self.schema.tool_name, query),
            IndexRecordOption::Basic,
        );
        clauses.push((
            Occur::Should,
            Box::new(BoostQuery::new(Box::new(exact_tool_name), 5.0)),
        ));

        let exact_full_name = TermQuery::new(
            Term::from_field_text(self.schema.full_tool_name, query),
            IndexRecordOption::Basic,
        );
        clauses.push((
            Occur::Should,
            Box::new(BoostQuery::new(Box::new(exact_full_name), 4.0)),
        ));

        // tantivy's RegexQuery already matches the whole term; no leading `^`.
        let prefix = RegexQuery::from_pattern(&format!("{escaped}.*"), self.schema.tool_name)?;
        clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(prefix), 3.0))));

        if query.contains('_') {
            let wildcard =
                RegexQuery::from_pattern(&format!(".*{escaped}.*"), self.schema.tool_name)?;
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(wildcard), 2.5)),
            ));
        }

        let tokenized_parser = QueryParser::for_index(
            &self.index,
            vec![self.schema.description, self.schema.params_json, self.schema.tags],
        );
        if let Ok(parsed) = tokenized_parser.parse_query(query) {
            clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(parsed), 1.0))));
        }

        let searchable_parser = QueryParser::for_index(&self.index, vec![self.schema.searchable_text]);
        if let Ok(parsed) = searchable_parser.parse_query(query) {
            clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(parsed), 1.5))));
        }

        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn delete_doc_unlocked(&self, writer: &mut IndexWriter, full_tool_name: &str) {
        let term = Term::from_field_text(self.schema.full_tool_name, full_tool_name);
        writer.delete_term(term);
    }

    fn to_tantivy_doc(&self, doc_rec: &ToolDocument) -> TantivyDocument {
        doc!(
            self.schema.tool_name => doc_rec.tool_name.clone(),
            self.schema.full_tool_name => doc_rec.full_tool_name.clone(),
            self.schema.server_name => doc_rec.server_name.clone(),
            self.schema.hash => doc_rec.hash.to_hex(),
            self.schema.description => doc_rec.description.clone(),
            self.schema.params_json => doc_rec.params_json.clone(),
            self.schema.tags => doc_rec.tags.clone(),
            self.schema.searchable_text => doc_rec.searchable_text.clone(),
        )
    }

    fn from_tantivy_doc(&self, doc: &TantivyDocument) -> ToolDocument {
        let get = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let hash_hex = get(self.schema.hash);
        ToolDocument {
            tool_name: get(self.schema.tool_name),
            full_tool_name: get(self.schema.full_tool_name),
            server_name: get(self.schema.server_name),
            description: get(self.schema.description),
            params_json: get(self.schema.params_json),
            hash: RapidHash::from_hex(&hash_hex).unwrap_or_default(),
            tags: get(self.schema.tags),
            searchable_text: get(self.schema.searchable_text),
        }
    }
}
