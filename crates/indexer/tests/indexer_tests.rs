//! End-to-end tests: a full indexer against the in-process bus and a
//! scripted provider.

mod common;

use common::*;

use letarette_core::DocumentId;
use letarette_indexer::Indexer;
use letarette_store::InterestState;

#[tokio::test]
async fn test_cold_start_with_empty_provider() {
  let cluster = cluster(&["wp"]).await;
  let provider = Provider::start(&cluster, vec![]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let provider = &provider;
  wait_until("the first index request", || async move { provider.index_request_count() >= 1 }).await;

  let request = provider.nth_index_request(0).unwrap();
  assert_eq!(request.space, "wp");
  assert_eq!(request.from_time.timestamp_nanos_opt().unwrap(), 0);
  assert!(request.after_document.is_empty());
  assert_eq!(request.limit, 3);

  indexer.close().await;

  // Nothing to do: empty interest list, cursor untouched
  assert!(cluster.store.get_interest_list("wp").await.unwrap().is_empty());
  let state = cluster.store.get_interest_list_state("wp").await.unwrap();
  assert_eq!(state.last_updated_nanos, 0);
  assert!(state.last_updated_doc_id.is_empty());
  assert_eq!(provider.document_request_count(), 0);
}

#[tokio::test]
async fn test_simple_chunk_is_requested_served_and_committed() {
  let cluster = cluster(&["wp"]).await;
  let provider = Provider::start(&cluster, vec![vec!["a", "b", "c"]]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let cluster = &cluster;
  let provider = &provider;

  // max_outstanding = 2: the first request covers a and b
  wait_until("the first document request", || async move {
    provider.document_request_count() >= 1
  })
  .await;
  assert_eq!(provider.nth_document_request(0).unwrap().wanted, ids(&["a", "b"]));

  // Serving b frees one slot, so c is requested alone
  provider.publish(&cluster, "wp", vec![doc("b", 100, true, "bravo")]).await;
  wait_until("the second document request", || async move {
    provider.document_request_count() >= 2
  })
  .await;
  assert_eq!(provider.nth_document_request(1).unwrap().wanted, ids(&["c"]));

  // Everything served: the cursor lands on the newest document
  provider
    .publish(
      &cluster,
      "wp",
      vec![doc("a", 50, true, "alpha"), doc("c", 200, true, "charlie")],
    )
    .await;
  wait_until("the commit to advance the cursor", || async move {
    let state = cluster.store.get_interest_list_state("wp").await.unwrap();
    state.last_updated_nanos == 200 && state.last_updated_doc_id.as_str() == "c"
  })
  .await;

  // The next chunk is pulled from the committed position
  wait_until("an index request from the new cursor", || async move {
    let requests = provider.index_requests.lock().unwrap().clone();
    requests
      .iter()
      .any(|r| r.from_time.timestamp_nanos_opt().unwrap() == 200 && r.after_document.as_str() == "c")
  })
  .await;

  indexer.close().await;

  let stats = cluster.store.index_stats().await.unwrap();
  assert_eq!(stats.docs, 3);
}

#[tokio::test]
async fn test_stalled_chunk_is_re_requested() {
  let mut cluster = cluster(&["wp"]).await;
  cluster.config.index.max_document_wait_ms = 50;
  let provider = Provider::start(&cluster, vec![vec!["x", "y"]]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let provider = &provider;

  // The provider never answers, so the same documents get requested again
  // after the stall timeout resets them to pending.
  wait_until("a re-request of the stalled chunk", || async move {
    provider.document_request_count() >= 2
  })
  .await;

  let first = provider.nth_document_request(0).unwrap();
  let second = provider.nth_document_request(1).unwrap();
  assert_eq!(first.wanted, ids(&["x", "y"]));
  assert_eq!(second.wanted, ids(&["x", "y"]));

  indexer.close().await;
}

#[tokio::test]
async fn test_in_flight_update_does_not_advance_cursor() {
  let cluster = cluster(&["wp"]).await;
  let provider = Provider::start(&cluster, vec![vec!["a"], vec!["a"]]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let cluster = &cluster;
  let provider = &provider;

  wait_until("the first document request", || async move {
    provider.document_request_count() >= 1
  })
  .await;

  // The provider re-stamped the document after list creation; the row is
  // served but the commit must not move the cursor.
  let overshoot = chrono::Utc::now().timestamp_nanos_opt().unwrap() + 3_600_000_000_000;
  provider
    .publish(&cluster, "wp", vec![doc("a", overshoot, true, "from the future")])
    .await;

  // The next chunk is requested from the unchanged position, and the
  // provider reports the same document again.
  wait_until("a second index request", || async move { provider.index_request_count() >= 2 }).await;
  let request = provider.nth_index_request(1).unwrap();
  assert_eq!(request.from_time.timestamp_nanos_opt().unwrap(), 0);
  assert!(request.after_document.is_empty());

  wait_until("the document to be re-listed", || async move {
    let list = cluster.store.get_interest_list("wp").await.unwrap();
    list.iter().any(|i| i.doc_id.as_str() == "a")
  })
  .await;

  indexer.close().await;

  let state = cluster.store.get_interest_list_state("wp").await.unwrap();
  assert_eq!(state.last_updated_nanos, 0);
}

#[tokio::test]
async fn test_graceful_shutdown_flushes_queued_updates() {
  let mut cluster = cluster(&["wp"]).await;
  cluster.config.index.max_outstanding = 4;
  cluster.config.index.chunk_size = 4;
  let provider = Provider::start(&cluster, vec![vec!["a", "b", "c", "d"]]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let cluster = &cluster;
  let provider = &provider;

  wait_until("the document request", || async move {
    provider.document_request_count() >= 1
  })
  .await;

  // Four updates go out, then the indexer is closed immediately. The
  // shutdown sequence must flush every enqueued update before returning.
  for (id, nanos) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
    provider
      .publish(&cluster, "wp", vec![doc(id, nanos, true, "payload")])
      .await;
  }
  indexer.close().await;

  let stats = cluster.store.index_stats().await.unwrap();
  assert_eq!(stats.docs, 4);
  let list = cluster.store.get_interest_list("wp").await.unwrap();
  assert!(list.iter().all(|i| i.state == InterestState::Served));
}

#[tokio::test]
async fn test_startup_clears_stale_interest_lists() {
  let cluster = cluster(&["wp"]).await;

  // A previous run crashed mid-chunk
  cluster.store.set_interest_list("wp", &ids(&["old-1", "old-2"])).await.unwrap();
  cluster
    .store
    .set_interest_state("wp", &DocumentId::from("old-1"), InterestState::Requested)
    .await
    .unwrap();

  let provider = Provider::start(&cluster, vec![]).await;
  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let provider = &provider;
  wait_until("the first index request", || async move { provider.index_request_count() >= 1 }).await;
  indexer.close().await;

  // The stale chunk is gone and was never re-requested
  assert!(cluster.store.get_interest_list("wp").await.unwrap().is_empty());
  assert_eq!(provider.document_request_count(), 0);
}

#[tokio::test]
async fn test_spaces_progress_independently() {
  let mut cluster = cluster(&["one", "two"]).await;
  cluster.config.index.max_outstanding = 4;
  let provider = Provider::start(&cluster, vec![vec!["a"], vec!["b"]]).await;

  let indexer = Indexer::start(&cluster.config, cluster.store.clone(), cluster.bus.clone())
    .await
    .unwrap();

  let cluster = &cluster;
  let provider = &provider;

  // The scripted provider hands chunk one to the first asking space and
  // chunk two to the second; serve whichever arrives where.
  wait_until("both document requests", || async move {
    provider.document_request_count() >= 2
  })
  .await;

  for n in 0..2 {
    let request = provider.nth_document_request(n).unwrap();
    for doc_id in &request.wanted {
      provider
        .publish(&cluster, &request.space, vec![doc(doc_id.as_str(), 100, true, "x")])
        .await;
    }
  }

  wait_until("both cursors to advance", || async move {
    let one = cluster.store.get_interest_list_state("one").await.unwrap();
    let two = cluster.store.get_interest_list_state("two").await.unwrap();
    one.last_updated_nanos == 100 && two.last_updated_nanos == 100
  })
  .await;

  indexer.close().await;
}
