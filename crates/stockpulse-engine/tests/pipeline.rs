//! End-to-end path: upload → validate → dashboard → batch → insight.

use async_trait::async_trait;
use std::sync::Mutex;

use stockpulse_core::metrics::MetricsReport;
use stockpulse_core::{Money, UploadStatus};
use stockpulse_db::{Database, DbConfig};
use stockpulse_engine::{
    Aggregator, EngineConfig, EngineResult, InsightGenerator, Intake, PairSelector, UploadRequest,
};

/// Records every payload and answers with a fixed line.
#[derive(Default)]
struct RecordingGenerator {
    payloads: Mutex<Vec<String>>,
}

#[async_trait]
impl InsightGenerator for RecordingGenerator {
    async fn generate(&self, _instruction: &str, metrics_json: &str) -> EngineResult<String> {
        self.payloads
            .lock()
            .unwrap()
            .push(metrics_json.to_string());
        Ok("1) Restock item A".to_string())
    }
}

fn request(record_type: &str, body: String, batch: &str) -> UploadRequest {
    UploadRequest {
        filename: format!("{record_type}-export.csv"),
        bytes: body.into_bytes(),
        record_type: record_type.to_string(),
        batch_id: Some(batch.to_string()),
        owner: Some("store-7".to_string()),
    }
}

fn sales_file(first_invoice: usize, rows: usize) -> String {
    let mut csv = String::from("invoice_id,invoice_date,customer_id,item_id,qty,unit_price,channel\n");
    for i in first_invoice..first_invoice + rows {
        csv.push_str(&format!("INV-{i},2024-05-{:02},C{i},A,2,1.25,web\n", 1 + i % 28));
    }
    csv
}

#[tokio::test]
async fn upload_validate_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.storage.root = dir.path().to_path_buf();

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let intake = Intake::new(db.clone(), &config);
    let aggregator = Aggregator::new(db, &config);

    // exactly the ceiling validates; extra columns are ignored
    let full = intake
        .accept_and_validate(request("sales", sales_file(0, 100), "may"))
        .await
        .unwrap();
    assert!(full.ok);
    assert_eq!(full.row_count, Some(100));

    let second = intake
        .accept_and_validate(request("sales", sales_file(100, 4), "may"))
        .await
        .unwrap();
    assert!(second.ok);

    let too_long = intake
        .accept_and_validate(request("sales", sales_file(200, 101), "may"))
        .await
        .unwrap();
    assert_eq!(too_long.status, UploadStatus::Invalid);

    let inventory = "move_id,move_date,item_id,type,qty,unit_cost\n\
                     M1,2024-05-01,A,in,100,5\n\
                     M2,2024-05-02,A,OUT,30,7\n"
        .to_string();
    let inv = intake
        .accept_and_validate(request("inventory", inventory, "may"))
        .await
        .unwrap();
    assert!(inv.ok);

    let stored = intake.get(full.upload_id).await.unwrap();
    assert!(stored
        .file_path
        .ends_with(&format!("{}-sales.csv", full.upload_id)));

    // dashboard of the first file alone
    let MetricsReport::Sales(single) = aggregator.dashboard(full.upload_id).await.unwrap() else {
        panic!("expected sales metrics");
    };
    assert_eq!(single.kpis.orders, 100);
    assert_eq!(single.kpis.revenue, "250".parse::<Money>().unwrap());

    // batch sums both valid sales files as one
    let batch = aggregator.batch_metrics("may").await.unwrap();
    let sales = batch.sales.as_ref().unwrap();
    assert_eq!(sales.kpis.orders, 104);
    assert_eq!(sales.kpis.units_sold, 208);
    assert_eq!(sales.kpis.revenue, "260".parse::<Money>().unwrap());
    assert_eq!(sales.kpis.aov, "2.5".parse::<Money>().unwrap());
    assert_eq!(batch.inventory.as_ref().unwrap().kpis.cogs, "210".parse::<Money>().unwrap());

    // pair by batch takes the newest sales file
    let pair = aggregator
        .pair_metrics(&PairSelector::Batch("may".to_string()))
        .await
        .unwrap();
    assert_eq!(pair.sales.unwrap().kpis.orders, 4);

    let generator = RecordingGenerator::default();
    let report = aggregator.batch_insight("may", &generator).await.unwrap();
    assert_eq!(report.insight, "1) Restock item A");

    let payloads = generator.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].chars().count() <= config.insight.payload_char_budget);

    // downstream bookkeeping
    let processed = intake.mark_processed(inv.upload_id).await.unwrap();
    assert_eq!(processed.status(), UploadStatus::Processed);
    assert!(intake.mark_processed(too_long.upload_id).await.is_err());

    let listed = aggregator.list_by_batch(Some("may")).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert_eq!(listed[0].id, inv.upload_id);
}
