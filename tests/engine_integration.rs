use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use index_readjuster_lib::core::clock::ManualClock;
use index_readjuster_lib::fetcher::SourceConnector;
use index_readjuster_lib::models::{RawDocument, RowPolicy};
use index_readjuster_lib::sources::Registry;
use index_readjuster_lib::{EngineError, ReadjustmentEngine, Result, Side, SourceDescriptor};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Anatel-style page: newest panel first, each year in its own table.
const IST_PAGE: &str = r#"
<html><body>
<div class="panel"><button class="panel-heading">2024</button>
  <table>
    <tr><td><strong>PERÍODO</strong></td><td><strong>VARIAÇÃO (%)</strong></td><td><strong>ÍNDICE</strong></td></tr>
    <tr><td>jan/24</td><td>3,27</td><td>118,52</td></tr>
  </table>
</div>
<div class="panel"><button class="panel-heading">2023</button>
  <table>
    <tr><td><strong>PERÍODO</strong></td><td><strong>VARIAÇÃO (%)</strong></td><td><strong>ÍNDICE</strong></td></tr>
    <tr><td>jul/23</td><td>1,15</td><td>116,09</td></tr>
    <tr><td>jan/23</td><td>2,01</td><td>114,77</td></tr>
  </table>
</div>
<div class="panel"><button class="panel-heading">Histórico</button>
  <table>
    <tr><td>PERÍODO</td><td>VARIAÇÃO (%)</td><td>ÍNDICE</td></tr>
    <tr><td>dez/1999</td><td></td><td>1.000,00</td></tr>
  </table>
</div>
</body></html>
"#;

/// Serves canned documents and counts fetches.
struct FakeConnector {
    doc: Mutex<RawDocument>,
    calls: AtomicUsize,
    delay: Duration,
}

impl FakeConnector {
    fn new(doc: RawDocument, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            doc: Mutex::new(doc),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn replace(&self, doc: RawDocument) {
        *self.doc.lock().unwrap() = doc;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for FakeConnector {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, _descriptor: &SourceDescriptor) -> Result<RawDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.doc.lock().unwrap().clone())
    }
}

struct Harness {
    engine: ReadjustmentEngine,
    ist: Arc<FakeConnector>,
    ipca: Arc<FakeConnector>,
    clock: Arc<ManualClock>,
}

fn ipca_payload() -> RawDocument {
    RawDocument::Json(json!([{
        "id": "2266",
        "resultados": [{
            "classificacoes": [],
            "series": [{
                "localidade": { "id": "1", "nome": "Brasil" },
                "serie": { "199312": "100.00", "202301": "6494.45", "202401": "6769.49" }
            }]
        }]
    }]))
}

fn harness_with(ist_descriptor: SourceDescriptor, delay: Duration) -> Harness {
    let ist = FakeConnector::new(RawDocument::Markup(IST_PAGE.to_string()), delay);
    let ipca = FakeConnector::new(ipca_payload(), delay);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));

    let ist_conn: Arc<dyn SourceConnector> = ist.clone();
    let ipca_conn: Arc<dyn SourceConnector> = ipca.clone();
    let engine = ReadjustmentEngine::with_connectors(
        vec![
            (ist_descriptor, ist_conn),
            (Registry::get_descriptor("ipca").unwrap(), ipca_conn),
        ],
        clock.clone(),
        Duration::from_secs(5),
    );

    Harness { engine, ist, ipca, clock }
}

fn harness() -> Harness {
    harness_with(Registry::get_descriptor("ist").unwrap(), Duration::ZERO)
}

#[tokio::test]
async fn test_list_periods_is_date_ordered() {
    let h = harness();
    let periods = h.engine.list_periods("ist").await.unwrap();
    assert_eq!(periods, vec!["dez/1999", "jan/23", "jul/23", "jan/24"]);

    let series = h.engine.series("ist").await.unwrap();
    for pair in series.points().windows(2) {
        assert!(pair[0].canonical_date <= pair[1].canonical_date);
    }
    assert_eq!(h.ist.calls(), 1);
}

#[tokio::test]
async fn test_get_point_exact_label() {
    let h = harness();

    let point = h.engine.get_point("ist", "jul/23").await.unwrap().unwrap();
    assert_eq!(point.index_value, 116.09);
    assert_eq!(point.variation, Some(1.15));

    let first = h.engine.get_point("ist", "dez/1999").await.unwrap().unwrap();
    assert_eq!(first.index_value, 1000.0);
    assert_eq!(first.variation, None);

    assert!(h.engine.get_point("ist", "Julho/2023").await.unwrap().is_none());
}

#[tokio::test]
async fn test_readjustment_end_to_end() {
    let h = harness();

    let r = h.engine.compute_readjustment("ist", 1000.0, "jan/23", "jan/24").await.unwrap();
    assert_eq!(r.ratio, 118.52 / 114.77);
    assert!((r.adjusted_amount - 1032.674).abs() < 1e-3);
    assert!((r.percent_change - 3.2674).abs() < 1e-3);

    let same = h.engine.compute_readjustment("ist", 150.0, "jul/23", "jul/23").await.unwrap();
    assert_eq!(same.adjusted_amount, 150.0);
    assert_eq!(same.percent_change, 0.0);
}

#[tokio::test]
async fn test_missing_labels_name_the_side_and_source() {
    let h = harness();

    let err = h.engine.compute_readjustment("ist", 100.0, "fev/23", "jan/24").await.unwrap_err();
    assert!(matches!(err, EngineError::PeriodNotFound { side: Side::Start, ref source_id, .. } if source_id == "ist"));

    let err = h.engine.compute_readjustment("ist", 100.0, "jan/23", "fev/24").await.unwrap_err();
    assert!(matches!(err, EngineError::PeriodNotFound { side: Side::End, .. }));
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_unknown_source() {
    let h = harness();
    let err = h.engine.list_periods("igpm").await.unwrap_err();
    assert_eq!(err, EngineError::UnknownSource("igpm".to_string()));
    assert!(err.is_user_error());

    let err = h.engine.get_point("igpm", "jan/23").await.unwrap_err();
    assert!(err.is_user_error());

    let err = h
        .engine
        .resolve_range("igpm", Some("jan/23".into()), Some("jan/24".into()))
        .await
        .unwrap_err();
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_resolve_range_fills_only_missing_sides() {
    let h = harness();

    let range = h
        .engine
        .resolve_range("ist", Some("jan/23".into()), Some("jul/23".into()))
        .await
        .unwrap();
    assert_eq!(range, ("jan/23".to_string(), "jul/23".to_string()));
    assert_eq!(h.ist.calls(), 0);

    let range = h.engine.resolve_range("ist", Some("jan/23".into()), None).await.unwrap();
    assert_eq!(range, ("jan/23".to_string(), "jan/24".to_string()));

    let range = h.engine.resolve_range("ist", None, None).await.unwrap();
    assert_eq!(range, ("dez/1999".to_string(), "jan/24".to_string()));
    assert_eq!(h.ist.calls(), 1);
}

#[tokio::test]
async fn test_api_source_labels_and_range() {
    let h = harness();

    let periods = h.engine.list_periods("ipca").await.unwrap();
    assert_eq!(periods, vec!["dez/1993", "jan/23", "jan/24"]);

    let (start, end) = h.engine.default_range("ipca").await.unwrap();
    assert_eq!((start.as_str(), end.as_str()), ("dez/1993", "jan/24"));

    let r = h.engine.compute_readjustment("ipca", 100.0, "jan/23", "jan/24").await.unwrap();
    assert!((r.adjusted_amount - 104.2351).abs() < 1e-3);
    assert_eq!(h.ipca.calls(), 1);
}

#[tokio::test]
async fn test_cache_ttl_and_refresh() {
    let h = harness();

    h.engine.list_periods("ist").await.unwrap();
    h.engine.get_point("ist", "jan/23").await.unwrap();
    assert_eq!(h.ist.calls(), 1);

    // Anatel publishes a new month; only visible after the 24h TTL
    h.ist.replace(RawDocument::Markup(IST_PAGE.replace(
        "<tr><td>jan/24</td><td>3,27</td><td>118,52</td></tr>",
        "<tr><td>fev/24</td><td>0,10</td><td>118,64</td></tr><tr><td>jan/24</td><td>3,27</td><td>118,52</td></tr>",
    )));
    h.clock.advance(ChronoDuration::hours(12));
    assert!(h.engine.get_point("ist", "fev/24").await.unwrap().is_none());

    h.clock.advance(ChronoDuration::hours(12));
    assert!(h.engine.get_point("ist", "fev/24").await.unwrap().is_some());
    assert_eq!(h.ist.calls(), 2);

    // IPCA never expires
    h.engine.series("ipca").await.unwrap();
    h.clock.advance(ChronoDuration::days(400));
    h.engine.series("ipca").await.unwrap();
    assert_eq!(h.ipca.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_single_flight() {
    let h = harness_with(Registry::get_descriptor("ist").unwrap(), Duration::from_millis(50));

    let (a, b, c) = tokio::join!(
        h.engine.list_periods("ist"),
        h.engine.compute_readjustment("ist", 10.0, "jan/23", "jan/24"),
        h.engine.get_point("ist", "jul/23"),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(h.ist.calls(), 1);
}

#[tokio::test]
async fn test_expired_series_refreshes_once_for_concurrent_callers() {
    let h = harness_with(Registry::get_descriptor("ist").unwrap(), Duration::from_millis(50));

    let old = h.engine.series("ist").await.unwrap();
    h.clock.advance(ChronoDuration::hours(25));

    let (a, b) = tokio::join!(h.engine.series("ist"), h.engine.series("ist"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(h.ist.calls(), 2);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&old, &a));
}

/// Crashes on its first fetch, then serves the IST page.
struct CrashingConnector {
    calls: AtomicUsize,
}

#[async_trait]
impl SourceConnector for CrashingConnector {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn fetch(&self, _descriptor: &SourceDescriptor) -> Result<RawDocument> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if n == 0 {
            panic!("connector crashed");
        }
        Ok(RawDocument::Markup(IST_PAGE.to_string()))
    }
}

#[tokio::test]
async fn test_crashed_fetch_errors_instead_of_hanging() {
    let connector = Arc::new(CrashingConnector { calls: AtomicUsize::new(0) });
    let conn: Arc<dyn SourceConnector> = connector.clone();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
    let engine = ReadjustmentEngine::with_connectors(
        vec![(Registry::get_descriptor("ist").unwrap(), conn)],
        clock,
        Duration::from_secs(1),
    );

    let guard = Duration::from_secs(3);
    let first = tokio::time::timeout(guard, engine.list_periods("ist"))
        .await
        .expect("crashed fetch must settle before the guard");
    assert!(matches!(first, Err(EngineError::Fetch { .. })));

    let second = tokio::time::timeout(guard, engine.list_periods("ist"))
        .await
        .expect("source must not stay wedged");
    assert_eq!(second.unwrap().len(), 4);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_surfaces_and_recovers() {
    let h = harness_with(Registry::get_descriptor("ist").unwrap(), Duration::from_millis(200));

    let err = h
        .engine
        .series_with_timeout("ist", Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));

    // Nothing was cached, so the next call fetches again
    assert!(h.engine.series("ist").await.is_ok());
    assert_eq!(h.ist.calls(), 2);
}

#[tokio::test]
async fn test_incomplete_page_and_row_policies() {
    let h = harness();
    h.ist.replace(RawDocument::Markup("<html><body>Carregando…</body></html>".to_string()));
    let err = h.engine.list_periods("ist").await.unwrap_err();
    assert!(matches!(err, EngineError::IncompleteDocument { .. }));

    let broken = IST_PAGE.replace("<td>116,09</td>", "<td>116,09</td><td>nota</td>");

    let strict = harness();
    strict.ist.replace(RawDocument::Markup(broken.clone()));
    let err = strict.engine.list_periods("ist").await.unwrap_err();
    assert!(matches!(err, EngineError::ColumnSchema { found: 4, .. }));

    let mut lenient_descriptor = Registry::get_descriptor("ist").unwrap();
    lenient_descriptor.row_policy = RowPolicy::SkipInvalid;
    let lenient = harness_with(lenient_descriptor, Duration::ZERO);
    lenient.ist.replace(RawDocument::Markup(broken));
    let periods = lenient.engine.list_periods("ist").await.unwrap();
    assert_eq!(periods, vec!["dez/1999", "jan/23", "jan/24"]);
}
