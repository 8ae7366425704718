// tests/orchestrator_test.rs

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{FakeHttp, FakePorts, FakeResolver, LOGIN_PAGE};
use recon_engine::core::models::{FindingDetails, ScanId};
use recon_engine::core::probe::RecordKind;
use recon_engine::{
    MemoryStore, ResultCategory, Scan, ScanError, ScanOrchestrator, ScanRequest, ScanStatus, ScanStore, ScanType,
    SqliteStore, ValidationError,
};

const POLL: Duration = Duration::from_millis(10);

async fn wait(orchestrator: &ScanOrchestrator, id: ScanId) -> Scan {
    tokio::time::timeout(Duration::from_secs(10), orchestrator.wait_for_scan(id, POLL))
        .await
        .expect("scan did not finish in time")
        .expect("scan disappeared")
}

fn example_resolver() -> FakeResolver {
    let mut resolver = FakeResolver::resolving(&["www.example.com", "api.example.com"]);
    resolver
        .records
        .insert(("example.com".to_string(), RecordKind::Mx), vec!["10 mail.example.com.".to_string()]);
    resolver
}

async fn subdomain_scan_completes(store: Arc<dyn ScanStore>) {
    let probes = common::probes(example_resolver(), FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(store, probes, common::test_config());

    let created = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 2))
        .await
        .unwrap();
    assert_eq!(created.status, ScanStatus::Pending);
    assert!(created.completed_at.is_none());

    let scan = wait(&orchestrator, created.id).await;
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.completed_at.is_some());

    let findings = orchestrator.get_findings(scan.id).await.unwrap();
    let domains: BTreeSet<String> = findings
        .iter()
        .map(|f| match &f.details {
            FindingDetails::Subdomain(d) => d.domain.clone(),
            other => panic!("unexpected finding {:?}", other),
        })
        .collect();
    assert!(domains.iter().all(|d| d.ends_with(".example.com")));
    assert_eq!(
        domains,
        ["api.example.com", "mail.example.com", "www.example.com"].iter().map(|d| d.to_string()).collect()
    );
    assert!(findings.iter().all(|f| f.scan_id == scan.id && f.severity.is_none()));
    assert_eq!(scan.findings.unwrap().count(ResultCategory::Subdomain), 3);
}

#[tokio::test]
async fn test_subdomain_scan_completes_in_memory() {
    subdomain_scan_completes(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_subdomain_scan_completes_in_sqlite() {
    let store = SqliteStore::in_memory().await.unwrap();
    subdomain_scan_completes(Arc::new(store)).await;
}

#[tokio::test]
async fn test_full_scan_keeps_findings_from_before_a_failure() {
    // The parameter strategy gets the page; the vulnerability strategy does not.
    let http = FakeHttp::page(LOGIN_PAGE, &[("server", "nginx")]).failing_after(1);
    let probes = common::probes(example_resolver(), FakePorts::with_open(&[22, 80]), http);
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, common::test_config());

    let created = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Full, 1))
        .await
        .unwrap();
    let scan = wait(&orchestrator, created.id).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    assert!(scan.completed_at.is_some());

    let findings = orchestrator.get_findings(scan.id).await.unwrap();
    let categories: BTreeSet<String> = findings.iter().map(|f| f.category().to_string()).collect();
    assert_eq!(
        categories,
        [ResultCategory::Parameter, ResultCategory::Subdomain].iter().map(|c| c.to_string()).collect()
    );

    let parameters: BTreeSet<String> = findings
        .iter()
        .filter_map(|f| match &f.details {
            FindingDetails::Parameter(p) => Some(p.name.clone()),
            _ => None,
        })
        .collect();
    for name in ["username", "password", "next", "q", "page"] {
        assert!(parameters.contains(name), "missing parameter {name}");
    }

    let summary = scan.findings.unwrap();
    assert_eq!(summary.count(ResultCategory::Subdomain), 3);
    assert_eq!(summary.count(ResultCategory::Port), 0);
}

#[tokio::test]
async fn test_cancelled_scan_stays_cancelled() {
    let resolver = FakeResolver { hang_all: true, ..Default::default() };
    let mut config = common::test_config();
    config.subdomain.resolver_timeout_ms = 300;
    let probes = common::probes(resolver, FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, config);

    let created = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 1))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.get_scan(created.id).await.unwrap().unwrap().status != ScanStatus::InProgress {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("scan never started");

    let cancelled = orchestrator.cancel_scan(created.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, ScanStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let scan = wait(&orchestrator, created.id).await;
    assert_eq!(scan.status, ScanStatus::Cancelled);

    // Give the worker time to reach its next checkpoint.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let scan = orchestrator.get_scan(created.id).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert!(orchestrator.get_findings(created.id).await.unwrap().is_empty());

    assert!(orchestrator.cancel_scan(created.id).await.is_err());
    assert!(orchestrator.cancel_scan(ScanId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_requests_are_not_persisted() {
    let probes = common::probes(FakeResolver::default(), FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, common::test_config());

    let err = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Full, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Validation(ValidationError::InvalidDepth(9))));

    let err = orchestrator
        .create_scan(ScanRequest::new("not a host", ScanType::Subdomain, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Validation(_)));

    assert!(orchestrator.list_scans().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_scans_keep_their_own_findings() {
    let probes = common::probes(example_resolver(), FakePorts::with_open(&[22, 80]), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, common::test_config());

    let subdomains = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 1))
        .await
        .unwrap();
    let ports = orchestrator
        .create_scan(ScanRequest::new("10.0.0.1", ScanType::PortScan, 1))
        .await
        .unwrap();

    assert_eq!(wait(&orchestrator, subdomains.id).await.status, ScanStatus::Completed);
    assert_eq!(wait(&orchestrator, ports.id).await.status, ScanStatus::Completed);

    let subdomain_findings = orchestrator.get_findings(subdomains.id).await.unwrap();
    assert!(!subdomain_findings.is_empty());
    assert!(subdomain_findings.iter().all(|f| f.category() == ResultCategory::Subdomain));

    let port_findings = orchestrator.get_findings(ports.id).await.unwrap();
    let open: BTreeSet<u16> = port_findings
        .iter()
        .map(|f| match &f.details {
            FindingDetails::Port(p) => p.port,
            other => panic!("unexpected finding {:?}", other),
        })
        .collect();
    assert_eq!(open, [22, 80].into_iter().collect());

    let listed = orchestrator.list_scans().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, ports.id);
}

#[tokio::test]
async fn test_findings_are_visible_while_the_scan_runs() {
    // www answers at once; every permutation of it hangs until the resolver timeout.
    let resolver = FakeResolver {
        hang_if: Some(|name| name.contains('-') || name.matches('.').count() > 2),
        ..FakeResolver::resolving(&["www.example.com"])
    };
    let mut config = common::test_config();
    config.subdomain.max_permutations = 10;
    config.subdomain.resolver_timeout_ms = 1500;
    let probes = common::probes(resolver, FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, config);

    let created = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 1))
        .await
        .unwrap();

    let early = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let findings = orchestrator.get_findings(created.id).await.unwrap();
            if !findings.is_empty() {
                return findings;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("no finding was persisted while the permutations were pending");

    assert_eq!(early.len(), 1);
    let running = orchestrator.get_scan(created.id).await.unwrap().unwrap();
    assert_eq!(running.status, ScanStatus::InProgress);

    let scan = wait(&orchestrator, created.id).await;
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.findings.unwrap().count(ResultCategory::Subdomain), 1);
    assert_eq!(orchestrator.get_findings(scan.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_panicking_worker_fails_the_scan() {
    let resolver = FakeResolver { panics: true, ..Default::default() };
    let probes = common::probes(resolver, FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, common::test_config());

    let created = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 1))
        .await
        .unwrap();
    let scan = wait(&orchestrator, created.id).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    assert!(scan.completed_at.is_some());
    assert!(orchestrator.get_findings(scan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_scan_cancelled_before_it_starts() {
    let resolver = FakeResolver { hang_all: true, ..Default::default() };
    let mut config = common::test_config();
    config.engine.max_concurrent_scans = 1;
    config.subdomain.resolver_timeout_ms = 300;
    let probes = common::probes(resolver, FakePorts::default(), FakeHttp::default());
    let orchestrator = common::orchestrator(Arc::new(MemoryStore::new()), probes, config);

    // The first scan holds the only worker slot.
    let first = orchestrator
        .create_scan(ScanRequest::new("example.com", ScanType::Subdomain, 1))
        .await
        .unwrap();
    let second = orchestrator
        .create_scan(ScanRequest::new("example.org", ScanType::Subdomain, 1))
        .await
        .unwrap();
    assert_eq!(orchestrator.get_scan(second.id).await.unwrap().unwrap().status, ScanStatus::Pending);

    let cancelled = orchestrator.cancel_scan(second.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, ScanStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    assert_eq!(wait(&orchestrator, first.id).await.status, ScanStatus::Completed);
    // Let the freed slot reach the cancelled scan.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let scan = orchestrator.get_scan(second.id).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert!(orchestrator.get_findings(second.id).await.unwrap().is_empty());
}
