//! End-to-end tests for the public Batchflow surface
//!
//! Drives a source the way a consuming screen would: paginate a fake API to
//! the end, refresh individual pages, and tear the list down.

use async_trait::async_trait;
use batchflow::{
    Batch, BatchAction, BatchFetcher, BatchListSource, BatchListState, BatchUpdateFetcher,
    FetchError, FetchedPage, OperationId, PaginationStatus, UpdateError, UpdateStream,
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Key = usize;
type Params = String;
type Data = Vec<String>;
type Request = String;
type State = BatchListState<Key, Params, Data>;
type Source = BatchListSource<Key, Params, Data, Request>;

/// Fake paged API: derives the next page index from how many batches the
/// engine has already loaded, the way a cursor would be derived.
struct PagedApi {
    pages: Vec<Data>,
}

#[async_trait]
impl BatchFetcher<Params, Key, Data> for PagedApi {
    async fn fetch(
        &self,
        _request: &Params,
        current: &[Batch<Key, Data>],
    ) -> Result<FetchedPage<Key, Data>, FetchError> {
        let index = current.len();
        match self.pages.get(index) {
            Some(data) => {
                let page = FetchedPage::page(index, data.clone())
                    .with_has_more(index + 1 < self.pages.len());
                Ok(page)
            }
            None => Ok(FetchedPage::empty()),
        }
    }
}

/// Fake refresh API: answers any update request by uppercasing the page
struct RefreshApi;

fn refreshed(batches: &[Batch<Key, Data>]) -> HashMap<Key, Data> {
    batches
        .iter()
        .map(|b| {
            let data = b.data.iter().map(|item| item.to_uppercase()).collect();
            (b.key, data)
        })
        .collect()
}

#[async_trait]
impl BatchUpdateFetcher<Key, Data, Request> for RefreshApi {
    async fn fetch_sync(
        &self,
        batches: &[Batch<Key, Data>],
        _request: &Request,
    ) -> Result<HashMap<Key, Data>, UpdateError> {
        Ok(refreshed(batches))
    }

    async fn fetch_async(
        &self,
        batches: &[Batch<Key, Data>],
        _request: &Request,
    ) -> Result<UpdateStream<Key, Data>, UpdateError> {
        let items: Vec<_> = refreshed(batches)
            .into_iter()
            .map(|(key, data)| (key, Ok(data)))
            .collect();
        Ok(futures::stream::iter(items).boxed())
    }
}

fn pages(n: usize) -> Vec<Data> {
    (0..n)
        .map(|i| vec![format!("item-{i}-a"), format!("item-{i}-b")])
        .collect()
}

async fn wait_until<F>(rx: &mut watch::Receiver<State>, pred: F) -> State
where
    F: Fn(&State) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(&rx.borrow()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("source dropped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

#[tokio::test]
async fn paginates_to_the_end_and_rejects_further_loads() {
    let api = Arc::new(PagedApi { pages: pages(3) });
    let source: Source = BatchListSource::new(api, None);
    let mut rx = source.observe();

    source
        .dispatch(BatchAction::reload("feed/v1".to_string()))
        .unwrap();
    wait_until(&mut rx, |s| s.status.is_content()).await;

    // Walk to the end with parameter-less LoadMore
    for expected_len in 2..=3 {
        source.dispatch(BatchAction::load_more()).unwrap();
        wait_until(&mut rx, |s| s.len() == expected_len && s.status.is_stable()).await;
    }

    let state = rx.borrow().clone();
    assert_eq!(state.status, PaginationStatus::Content { has_more: false });
    assert_eq!(state.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(
        state.get(&1).unwrap().data,
        vec!["item-1-a".to_string(), "item-1-b".to_string()]
    );
    assert_eq!(state.last_request_params, Some("feed/v1".to_string()));

    // End of data: a further parameter-less LoadMore leaves state untouched
    source.dispatch(BatchAction::load_more()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.current(), state);
}

#[tokio::test]
async fn refreshes_pages_sync_and_async_without_touching_the_rest() {
    let api = Arc::new(PagedApi { pages: pages(2) });
    let source: Source = BatchListSource::new(api, Some(Arc::new(RefreshApi)));
    let mut rx = source.observe();
    let mut events = source.update_results();

    source
        .dispatch(BatchAction::reload("feed/v1".to_string()))
        .unwrap();
    wait_until(&mut rx, |s| s.status.is_content()).await;
    source.dispatch(BatchAction::load_more()).unwrap();
    wait_until(&mut rx, |s| s.len() == 2).await;

    // Synchronous refresh of page 0 only
    source
        .dispatch(BatchAction::update_with_id(
            [0].into(),
            "refresh".to_string(),
            "refresh-0",
        ))
        .unwrap();
    let state = wait_until(&mut rx, |s| s.get(&0).unwrap().data[0] == "ITEM-0-A").await;
    assert_eq!(state.get(&1).unwrap().data[0], "item-1-a");
    assert_eq!(state.status, PaginationStatus::Content { has_more: false });

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.operation_id, OperationId::from("refresh-0"));
    assert_eq!(event.result, Ok(vec![0]));

    // Asynchronous refresh of page 1
    source
        .dispatch(BatchAction::update_async([1].into(), "refresh".to_string()))
        .unwrap();
    let state = wait_until(&mut rx, |s| s.get(&1).unwrap().data[0] == "ITEM-1-A").await;
    assert_eq!(state.len(), 2);

    // Reset tears everything back to the initial state
    source.dispatch(BatchAction::Reset).unwrap();
    let state = wait_until(&mut rx, |s| s.status == PaginationStatus::None).await;
    assert!(state.is_empty());
    assert!(state.last_request_params.is_none());
    assert!(state.in_flight_updates.is_empty());

    source.shutdown().await;
}
