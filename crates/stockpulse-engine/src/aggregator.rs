//! # Aggregator
//!
//! Read-side operations over validated uploads: listings, per-upload
//! dashboards, sales/inventory pairs, whole batches, and the insight
//! variants of each.
//!
//! ## Batch Aggregation
//! ```text
//! batch "q1"
//!   ├── 3-sales.csv      (validated) ──┐
//!   ├── 5-sales.csv      (processed) ──┼─► rows concatenated ─► compute once ─► sales
//!   ├── 6-sales.csv      (invalid)     ✗
//!   └── 4-inventory.csv  (validated) ────► rows ──────────────► compute once ─► inventory
//! ```
//!
//! Metrics reflect the union of all matching files, never an average of
//! per-file results. Every call re-reads its files; nothing is cached.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::insight::{truncate_payload, InsightGenerator, InsightKind};
use crate::storage::FileStore;
use stockpulse_core::metrics::{compute, CombinedMetrics, MetricsReport};
use stockpulse_core::table::CsvTable;
use stockpulse_core::validation::decode_rows;
use stockpulse_core::{CoreError, RecordSet, RecordType, UploadRecord};
use stockpulse_db::Database;

/// Listing cap when no batch filter is given.
pub const LIST_LIMIT: u32 = 50;

// =============================================================================
// Selections & Reports
// =============================================================================

/// How a sales/inventory pair is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairSelector {
    /// Two explicit uploads.
    Ids { sales: i64, inventory: i64 },
    /// The most recent ready upload of each type in a batch.
    Batch(String),
}

/// Metrics together with the generated analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsightReport<M> {
    pub metrics: M,
    pub insight: String,
}

// =============================================================================
// Aggregator
// =============================================================================

#[derive(Debug, Clone)]
pub struct Aggregator {
    db: Database,
    store: FileStore,
    payload_char_budget: usize,
}

impl Aggregator {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Aggregator {
            db,
            store: FileStore::new(&config.storage.root),
            payload_char_budget: config.insight.payload_char_budget,
        }
    }

    /// Uploads, most recent first.
    ///
    /// With a batch id every upload of that batch is returned; without one
    /// the listing stops at [`LIST_LIMIT`].
    pub async fn list_by_batch(&self, batch_id: Option<&str>) -> EngineResult<Vec<UploadRecord>> {
        let limit = match batch_id {
            Some(_) => None,
            None => Some(LIST_LIMIT),
        };
        Ok(self.db.uploads().list(batch_id, limit).await?)
    }

    /// Metrics of one ready upload.
    pub async fn dashboard(&self, id: i64) -> EngineResult<MetricsReport> {
        let record = self.get(id).await?;
        let rows = self.load_rows(&record).await?;
        let report = compute_for(id, &rows)?;

        debug!(upload_id = id, record_type = %record.record_type, rows = rows.len(), "Computed dashboard");
        Ok(report)
    }

    /// Metrics of one sales and one inventory upload side by side.
    ///
    /// ## Errors
    /// - `UploadNotReady` when either member is not validated/processed
    /// - `RecordTypeMismatch` when an explicit id has the wrong type
    /// - `MissingPairMember` when a batch lacks a ready upload of a type
    pub async fn pair_metrics(&self, selector: &PairSelector) -> EngineResult<CombinedMetrics> {
        let (sales, inventory) = match selector {
            PairSelector::Ids { sales, inventory } => {
                let sales = self.get(*sales).await?;
                let inventory = self.get(*inventory).await?;
                sales.ensure_type(RecordType::Sales)?;
                inventory.ensure_type(RecordType::Inventory)?;
                (sales, inventory)
            }
            PairSelector::Batch(batch_id) => (
                self.latest_ready(batch_id, RecordType::Sales).await?,
                self.latest_ready(batch_id, RecordType::Inventory).await?,
            ),
        };

        sales.ensure_ready()?;
        inventory.ensure_ready()?;

        let mut combined = CombinedMetrics::default();
        combined.insert(compute_for(sales.id, &self.load_rows(&sales).await?)?);
        combined.insert(compute_for(inventory.id, &self.load_rows(&inventory).await?)?);

        info!(sales_id = sales.id, inventory_id = inventory.id, "Computed pair metrics");
        Ok(combined)
    }

    /// Metrics over every ready upload in a batch.
    ///
    /// Fails with `NoDataInBatch` when the batch has no validated or
    /// processed upload of either type.
    pub async fn batch_metrics(&self, batch_id: &str) -> EngineResult<CombinedMetrics> {
        let uploads = self.db.uploads().list_ready_in_batch(batch_id).await?;
        if uploads.is_empty() {
            return Err(CoreError::NoDataInBatch {
                batch_id: batch_id.to_string(),
            }
            .into());
        }

        // (last upload loaded into the slot, concatenated rows)
        let mut sales: Option<(i64, RecordSet)> = None;
        let mut inventory: Option<(i64, RecordSet)> = None;

        for upload in &uploads {
            let rows = self.load_rows(upload).await?;
            let slot = match upload.record_type {
                RecordType::Sales => &mut sales,
                RecordType::Inventory => &mut inventory,
            };
            match slot {
                Some((last_id, existing)) => {
                    let expected = existing.record_type();
                    if !existing.extend(rows) {
                        return Err(contract_violation(
                            upload.id,
                            format!("decoded rows are not {expected} rows"),
                        ));
                    }
                    *last_id = upload.id;
                }
                None => *slot = Some((upload.id, rows)),
            }
        }

        let mut combined = CombinedMetrics::default();
        for (upload_id, rows) in [sales, inventory].into_iter().flatten() {
            combined.insert(compute_for(upload_id, &rows)?);
        }

        info!(batch_id, uploads = uploads.len(), "Computed batch metrics");
        Ok(combined)
    }

    // =========================================================================
    // Insight
    // =========================================================================

    /// Dashboard metrics plus generated analysis.
    pub async fn insight(
        &self,
        id: i64,
        generator: &dyn InsightGenerator,
    ) -> EngineResult<InsightReport<MetricsReport>> {
        let metrics = self.dashboard(id).await?;
        self.with_insight(metrics, InsightKind::Single, generator).await
    }

    pub async fn pair_insight(
        &self,
        selector: &PairSelector,
        generator: &dyn InsightGenerator,
    ) -> EngineResult<InsightReport<CombinedMetrics>> {
        let metrics = self.pair_metrics(selector).await?;
        self.with_insight(metrics, InsightKind::Pair, generator).await
    }

    pub async fn batch_insight(
        &self,
        batch_id: &str,
        generator: &dyn InsightGenerator,
    ) -> EngineResult<InsightReport<CombinedMetrics>> {
        let metrics = self.batch_metrics(batch_id).await?;
        self.with_insight(metrics, InsightKind::Batch, generator).await
    }

    async fn with_insight<M: Serialize>(
        &self,
        metrics: M,
        kind: InsightKind,
        generator: &dyn InsightGenerator,
    ) -> EngineResult<InsightReport<M>> {
        let json = serde_json::to_string(&metrics)?;
        let payload = truncate_payload(&json, self.payload_char_budget);

        debug!(?kind, chars = payload.chars().count(), truncated = payload.len() < json.len(), "Sending metrics for insight");

        let insight = generator
            .generate(kind.instruction(), payload)
            .await
            .map_err(|e| {
                error!(?kind, error = %e, "Insight generation failed");
                e
            })?;

        Ok(InsightReport { metrics, insight })
    }

    // =========================================================================
    // Loading
    // =========================================================================

    async fn get(&self, id: i64) -> EngineResult<UploadRecord> {
        self.db
            .uploads()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::UploadNotFound(id).into())
    }

    async fn latest_ready(&self, batch_id: &str, record_type: RecordType) -> EngineResult<UploadRecord> {
        self.db
            .uploads()
            .latest_ready_of_type(batch_id, record_type)
            .await?
            .ok_or_else(|| {
                CoreError::MissingPairMember {
                    record_type: record_type.to_string(),
                }
                .into()
            })
    }

    /// Re-reads and decodes a ready upload's file.
    ///
    /// Anything that stops a validated file from decoding is a
    /// `ContractViolation`; nothing is zero-filled.
    async fn load_rows(&self, record: &UploadRecord) -> EngineResult<RecordSet> {
        record.ensure_ready()?;

        let bytes = self.store.read(&record.file_path).await.map_err(|e| {
            error!(upload_id = record.id, path = %record.file_path, error = %e, "Validated file is unreadable");
            contract_violation(record.id, format!("file unreadable: {e}"))
        })?;

        CsvTable::parse(&bytes, None)
            .and_then(|table| decode_rows(record.record_type, &table))
            .map_err(|e| {
                error!(upload_id = record.id, error = %e, "Validated file no longer decodes");
                contract_violation(record.id, e.to_string())
            })
    }
}

/// Metrics of rows loaded from `upload_id`; an overflow means the rows broke
/// the bounds validation guarantees.
fn compute_for(upload_id: i64, rows: &RecordSet) -> EngineResult<MetricsReport> {
    compute(rows).map_err(|e| {
        error!(upload_id, error = %e, "Metrics computation failed");
        contract_violation(upload_id, e.to_string())
    })
}

fn contract_violation(upload_id: i64, reason: impl Into<String>) -> EngineError {
    CoreError::ContractViolation {
        upload_id,
        reason: reason.into(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::MockInsightGenerator;
    use crate::intake::{Intake, UploadRequest};
    use stockpulse_core::{InventoryRow, Money, MovementType, UploadStatus};
    use stockpulse_db::DbConfig;
    use tempfile::TempDir;

    const SALES: &str = "invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n\
                         INV-1,2024-03-01,C1,A,2,10.00\n\
                         INV-2,2024-03-02,C2,B,1,5.50\n";

    const INVENTORY: &str = "move_id,move_date,item_id,type,qty,unit_cost\n\
                             M1,2024-03-01,A,IN,100,5\n\
                             M2,2024-03-03,A,OUT,30,7\n";

    struct Fixture {
        intake: Intake,
        aggregator: Aggregator,
        _dir: TempDir,
    }

    async fn fixture(budget: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.root = dir.path().to_path_buf();
        config.insight.payload_char_budget = budget;
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Fixture {
            intake: Intake::new(db.clone(), &config),
            aggregator: Aggregator::new(db, &config),
            _dir: dir,
        }
    }

    fn request(record_type: &str, body: &str, batch: Option<&str>) -> UploadRequest {
        UploadRequest {
            filename: format!("{record_type}.csv"),
            bytes: body.as_bytes().to_vec(),
            record_type: record_type.to_string(),
            batch_id: batch.map(str::to_string),
            owner: None,
        }
    }

    impl Fixture {
        /// Accepts and validates; returns the upload id.
        async fn upload(&self, record_type: &str, body: &str, batch: Option<&str>) -> i64 {
            let receipt = self
                .intake
                .accept_and_validate(request(record_type, body, batch))
                .await
                .unwrap();
            receipt.upload_id
        }

        /// Accepts only, leaving the upload in `uploaded`.
        async fn accept(&self, record_type: &str, body: &str, batch: Option<&str>) -> i64 {
            let record = self
                .intake
                .accept_upload(request(record_type, body, batch))
                .await
                .unwrap();
            assert_eq!(record.status(), UploadStatus::Uploaded);
            record.id
        }
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_sales() {
        let fx = fixture(8000).await;
        let id = fx.upload("sales", SALES, None).await;

        let report = fx.aggregator.dashboard(id).await.unwrap();
        let MetricsReport::Sales(m) = report else {
            panic!("expected sales metrics");
        };
        assert_eq!(m.kpis.revenue, money("25.50"));
        assert_eq!(m.kpis.orders, 2);
        assert_eq!(m.top_items[0].item_id, "A");
    }

    #[tokio::test]
    async fn test_dashboard_is_idempotent() {
        let fx = fixture(8000).await;
        let id = fx.upload("inventory", INVENTORY, None).await;

        let first = serde_json::to_string(&fx.aggregator.dashboard(id).await.unwrap()).unwrap();
        let second = serde_json::to_string(&fx.aggregator.dashboard(id).await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dashboard_rejects_invalid_upload() {
        let fx = fixture(8000).await;
        let id = fx.upload("sales", "invoice_id\nX\n", None).await;

        let err = fx.aggregator.dashboard(id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::UploadNotReady {
                status: UploadStatus::Invalid,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_tampered_file_is_contract_violation() {
        let fx = fixture(8000).await;
        let id = fx.upload("sales", SALES, None).await;
        let record = fx.intake.get(id).await.unwrap();
        tokio::fs::write(
            &record.file_path,
            "invoice_id,invoice_date,customer_id,item_id,qty,unit_price\nX,yesterday,C,A,1,1\n",
        )
        .await
        .unwrap();

        let err = fx.aggregator.dashboard(id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::ContractViolation { upload_id, .. }) if upload_id == id
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_file_is_contract_violation() {
        let fx = fixture(8000).await;
        let id = fx.upload("inventory", INVENTORY, None).await;
        let record = fx.intake.get(id).await.unwrap();
        tokio::fs::write(
            &record.file_path,
            "move_id,move_date,item_id,type,qty,unit_cost\nM1,2024-03-01,A,OUT,-9223372036854775808,1\n",
        )
        .await
        .unwrap();

        let err = fx.aggregator.dashboard(id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::ContractViolation { upload_id, .. }) if upload_id == id
        ));
    }

    #[test]
    fn test_metric_overflow_is_reported_against_the_upload() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let huge = |move_id: &str| InventoryRow {
            move_id: move_id.to_string(),
            move_date: day,
            item_id: "A".to_string(),
            movement: MovementType::In,
            qty: i64::MAX,
            unit_cost: money("0"),
        };
        let rows = RecordSet::Inventory(vec![huge("M1"), huge("M2")]);

        let err = compute_for(9, &rows).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::ContractViolation { upload_id: 9, ref reason })
                if reason.contains("overflow")
        ));
    }

    #[tokio::test]
    async fn test_uploaded_member_is_not_ready() {
        let fx = fixture(8000).await;
        let sales = fx.upload("sales", SALES, None).await;
        let pending = fx.accept("inventory", INVENTORY, None).await;

        let err = fx.aggregator.dashboard(pending).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::UploadNotReady {
                id,
                status: UploadStatus::Uploaded,
            }) if id == pending
        ));

        let err = fx
            .aggregator
            .pair_metrics(&PairSelector::Ids {
                sales,
                inventory: pending,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::UploadNotReady {
                id,
                status: UploadStatus::Uploaded,
            }) if id == pending
        ));

        let generator = MockInsightGenerator::new();
        let err = fx
            .aggregator
            .pair_insight(
                &PairSelector::Ids {
                    sales,
                    inventory: pending,
                },
                &generator,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::UploadNotReady {
                status: UploadStatus::Uploaded,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_pair_by_ids() {
        let fx = fixture(8000).await;
        let sales = fx.upload("sales", SALES, None).await;
        let inventory = fx.upload("inventory", INVENTORY, None).await;

        let combined = fx
            .aggregator
            .pair_metrics(&PairSelector::Ids { sales, inventory })
            .await
            .unwrap();
        let inv = combined.inventory.unwrap();
        assert_eq!(inv.kpis.cogs, money("210"));
        assert_eq!(inv.inventory_levels[0].on_hand, 70);
        assert_eq!(inv.inventory_levels[0].wac, money("5"));
        assert_eq!(inv.inventory_levels[0].value, money("350"));
        assert!(combined.sales.is_some());

        let swapped = fx
            .aggregator
            .pair_metrics(&PairSelector::Ids {
                sales: inventory,
                inventory: sales,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            swapped,
            EngineError::Core(CoreError::RecordTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_pair_requires_ready_members() {
        let fx = fixture(8000).await;
        let sales = fx.upload("sales", SALES, None).await;
        let inventory = fx.upload("inventory", "move_id\nM\n", None).await;

        let err = fx
            .aggregator
            .pair_metrics(&PairSelector::Ids { sales, inventory })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::UploadNotReady { .. })));
    }

    #[tokio::test]
    async fn test_pair_by_batch_picks_latest_ready() {
        let fx = fixture(8000).await;
        let _old = fx.upload("sales", SALES, Some("q1")).await;
        let newer = "invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n\
                     INV-9,2024-03-05,C9,Z,1,1.00\n";
        let _new = fx.upload("sales", newer, Some("q1")).await;
        let _inv = fx.upload("inventory", INVENTORY, Some("q1")).await;

        let combined = fx
            .aggregator
            .pair_metrics(&PairSelector::Batch("q1".to_string()))
            .await
            .unwrap();
        assert_eq!(combined.sales.unwrap().kpis.revenue, money("1.00"));

        let err = fx
            .aggregator
            .pair_metrics(&PairSelector::Batch("empty".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::MissingPairMember { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_concatenates_files() {
        let fx = fixture(8000).await;
        let more = "invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n\
                    INV-3,2024-03-02,C3,A,3,10.00\n";
        fx.upload("sales", SALES, Some("q1")).await;
        fx.upload("sales", more, Some("q1")).await;
        fx.upload("sales", "bad\n", Some("q1")).await;
        fx.upload("sales", SALES, Some("q2")).await;

        let combined = fx.aggregator.batch_metrics("q1").await.unwrap();
        let sales = combined.sales.unwrap();
        assert_eq!(sales.kpis.orders, 3);
        assert_eq!(sales.kpis.revenue, money("55.50"));
        assert_eq!(sales.kpis.units_sold, 6);
        assert!(combined.inventory.is_none());
    }

    #[tokio::test]
    async fn test_batch_without_ready_uploads() {
        let fx = fixture(8000).await;
        fx.upload("sales", "bad\n", Some("q1")).await;

        let err = fx.aggregator.batch_metrics("q1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::NoDataInBatch { ref batch_id }) if batch_id == "q1"
        ));
    }

    #[tokio::test]
    async fn test_list_by_batch() {
        let fx = fixture(8000).await;
        let a = fx.upload("sales", SALES, Some("q1")).await;
        let _b = fx.upload("sales", SALES, Some("q2")).await;
        let c = fx.upload("inventory", INVENTORY, Some("q1")).await;

        let q1 = fx.aggregator.list_by_batch(Some("q1")).await.unwrap();
        let ids: Vec<i64> = q1.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![c, a]);

        assert_eq!(fx.aggregator.list_by_batch(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_insight_sends_truncated_payload() {
        let fx = fixture(20).await;
        let id = fx.upload("sales", SALES, None).await;

        let mut generator = MockInsightGenerator::new();
        generator
            .expect_generate()
            .withf(|instruction, json| {
                instruction.contains("5 concise") && json.chars().count() == 20
            })
            .times(1)
            .returning(|_, _| Ok("1) Item A leads revenue".to_string()));

        let report = fx.aggregator.insight(id, &generator).await.unwrap();
        assert_eq!(report.insight, "1) Item A leads revenue");
        assert!(matches!(report.metrics, MetricsReport::Sales(_)));
    }

    #[tokio::test]
    async fn test_insight_failure_leaves_upload_untouched() {
        let fx = fixture(8000).await;
        let id = fx.upload("sales", SALES, Some("q1")).await;

        let mut generator = MockInsightGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(EngineError::downstream(Some(500), "model crashed")));

        let err = fx.aggregator.batch_insight("q1", &generator).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DownstreamCollaborator { status: Some(500), .. }
        ));

        assert_eq!(fx.intake.status(id).await.unwrap().status, UploadStatus::Validated);
        assert!(fx.aggregator.dashboard(id).await.is_ok());
    }
}
