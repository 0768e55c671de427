use circulation_core::{
    CirculationConfig, CirculationEngine, Decision, InMemoryPatronDirectory, PatronDirectory,
    PatronStanding, RequestStatus, WorkflowError,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

const WORKERS: usize = 8;

fn open_engine(path: &Path, directory: &Arc<InMemoryPatronDirectory>) -> CirculationEngine {
    let directory: Arc<dyn PatronDirectory> = directory.clone();
    CirculationEngine::open(path, directory, CirculationConfig::default()).unwrap()
}

#[test]
fn racing_approvals_for_last_copy_grant_exactly_one_loan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let directory = Arc::new(InMemoryPatronDirectory::new());
    let admin = Uuid::new_v4();
    directory.upsert(admin, PatronStanding::admin());

    let mut setup = open_engine(&path, &directory);
    let item = setup.register_item("The Name of the Rose", 1).unwrap();
    let mut request_ids = Vec::new();
    for _ in 0..WORKERS {
        let patron = Uuid::new_v4();
        directory.upsert(patron, PatronStanding::approved_patron());
        let request = setup
            .submit_borrow_request(patron, item.item_id, None)
            .unwrap();
        request_ids.push(request.request_id);
    }

    let barrier = Arc::new(Barrier::new(WORKERS));
    let workers: Vec<_> = request_ids
        .iter()
        .copied()
        .map(|request_id| {
            let path = path.clone();
            let directory = Arc::clone(&directory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut engine = open_engine(&path, &directory);
                barrier.wait();
                engine.decide_request(request_id, admin, &Decision::approve())
            })
        })
        .collect();

    let results: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker thread panicked"))
        .collect();

    let approved = results.iter().filter(|result| result.is_ok()).count();
    let unavailable = results
        .iter()
        .filter(|result| matches!(result, Err(WorkflowError::ItemUnavailable(_))))
        .count();
    assert_eq!(approved, 1, "results: {results:?}");
    assert_eq!(unavailable, WORKERS - 1, "results: {results:?}");

    let stored = setup.get_item(item.item_id).unwrap().unwrap();
    assert_eq!(stored.available_copies, 0);
    assert!(setup.audit_item(item.item_id).unwrap().is_consistent());

    let pending = setup.list_pending_requests().unwrap();
    assert_eq!(pending.len(), WORKERS - 1);
    assert!(pending
        .iter()
        .all(|request| request.status == RequestStatus::Pending));
}

#[test]
fn racing_duplicate_submissions_land_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dupes.db");
    let directory = Arc::new(InMemoryPatronDirectory::new());
    let patron = Uuid::new_v4();
    directory.upsert(patron, PatronStanding::approved_patron());

    let mut setup = open_engine(&path, &directory);
    let item = setup.register_item("Rebecca", 4).unwrap();

    let barrier = Arc::new(Barrier::new(WORKERS));
    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let directory = Arc::clone(&directory);
            let barrier = Arc::clone(&barrier);
            let item_id = item.item_id;
            thread::spawn(move || {
                let mut engine = open_engine(&path, &directory);
                barrier.wait();
                engine.submit_borrow_request(patron, item_id, None)
            })
        })
        .collect();

    let results: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().all(|result| match result {
        Ok(_) => true,
        Err(err) => matches!(err, WorkflowError::DuplicateRequest(_)),
    }));
    assert_eq!(setup.list_requests_for_patron(patron).unwrap().len(), 1);
}
