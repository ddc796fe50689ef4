use std::collections::BTreeMap;

use crate::engine::{CredxEngine, SearchCursor};
use crate::error::EngineResult;
use crate::wallet::{Record, WalletQuery};

/// Wallet record CRUD and cursor-based search. Search handles share the
/// "opaque handle + explicit release" discipline of protocol objects but
/// live in their own table.
impl CredxEngine {
    pub async fn wallet_add_record(
        &self,
        category: &str,
        id: &str,
        value: &str,
        tags_json: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        let tags: BTreeMap<String, String> = if tags_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(tags_json)?
        };
        self.wallet.add_record(category, id, value, &tags).await
    }

    pub async fn wallet_get_record(&self, category: &str, id: &str) -> EngineResult<String> {
        self.check_open()?;
        let record = self.wallet.get_record(category, id).await?;
        Ok(serde_json::to_string(&record)?)
    }

    pub async fn wallet_update_record_value(
        &self,
        category: &str,
        id: &str,
        value: &str,
    ) -> EngineResult<()> {
        self.check_open()?;
        self.wallet.update_record_value(category, id, value).await
    }

    pub async fn wallet_delete_record(&self, category: &str, id: &str) -> EngineResult<()> {
        self.check_open()?;
        self.wallet.delete_record(category, id).await
    }

    /// Run the query now and park the result set behind a cursor handle.
    pub async fn wallet_open_search(
        &self,
        category: &str,
        query_json: &str,
    ) -> EngineResult<u32> {
        self.check_open()?;
        let query = WalletQuery::from_json(query_json)?;
        let records = self.wallet.search_records(category, &query).await?;
        self.searches.add(SearchCursor {
            records,
            position: 0,
        })
    }

    /// At most `count` further records; an empty page signals exhaustion.
    pub async fn wallet_search_fetch_next(
        &self,
        handle: u32,
        count: usize,
    ) -> EngineResult<Vec<Record>> {
        self.check_open()?;
        let entry = self.searches.entry(handle)?;
        let mut cursor = entry.lock().await;
        let remaining = cursor.records.len().saturating_sub(cursor.position);
        let take = remaining.min(count);
        let page = cursor.records[cursor.position..cursor.position + take].to_vec();
        cursor.position += take;
        Ok(page)
    }

    pub fn wallet_close_search(&self, handle: u32) -> EngineResult<()> {
        self.searches.release(handle)
    }
}
