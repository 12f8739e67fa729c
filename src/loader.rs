//! Asynchronous dataset loading.
//!
//! Every call to [`Loader::select`] issues a new [`LoadToken`] and aborts the
//! previous in-flight task. Completed loads come back over a channel and are
//! only accepted while their token is still the current one, so a slow, older
//! request can never overwrite the data of a newer selection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::dataset::{DatasetId, Record, Sources, parse_csv};
use crate::domain::NGError;

pub type FetchFuture = BoxFuture<'static, Result<Vec<u8>, NGError>>;

/// Retrieves the raw bytes behind a source locator.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, dataset: DatasetId, url: &str) -> FetchFuture;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, NGError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NGError::TaskFailed(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, dataset: DatasetId, url: &str) -> FetchFuture {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let retrieval = |e: reqwest::Error| NGError::Retrieval {
                dataset,
                reason: e.to_string(),
            };
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(retrieval)?
                .error_for_status()
                .map_err(retrieval)?;
            let bytes = resp.bytes().await.map_err(retrieval)?;
            trace!("Fetched {} bytes from {url}", bytes.len());
            Ok(bytes.to_vec())
        }
        .boxed()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadToken(u64);

impl LoadToken {
    fn next(self) -> Self {
        LoadToken(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading {
        token: LoadToken,
        dataset: DatasetId,
    },
    Loaded {
        token: LoadToken,
        dataset: DatasetId,
        records: usize,
    },
    Failed {
        token: LoadToken,
        dataset: DatasetId,
        reason: String,
    },
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub token: LoadToken,
    pub dataset: DatasetId,
    pub result: Result<Vec<Record>, NGError>,
}

pub struct Loader {
    fetcher: Arc<dyn Fetcher>,
    sources: Sources,
    timeout: Duration,
    runtime: Handle,
    tx: UnboundedSender<LoadOutcome>,
    rx: UnboundedReceiver<LoadOutcome>,
    current: LoadToken,
    state: LoadState,
    task: Option<JoinHandle<()>>,
}

impl Loader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        sources: Sources,
        timeout: Duration,
        runtime: Handle,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            sources,
            timeout,
            runtime,
            tx,
            rx,
            current: LoadToken::default(),
            state: LoadState::Idle,
            task: None,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn current_token(&self) -> LoadToken {
        self.current
    }

    /// Start loading `dataset`, superseding any load still in flight.
    pub fn select(&mut self, dataset: DatasetId) -> LoadToken {
        self.current = self.current.next();
        let token = self.current;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let url = self.sources.url(dataset).to_string();
        info!("Loading {} from {url} ({token:?})", dataset.label());
        self.state = LoadState::Loading { token, dataset };

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let timeout = self.timeout;
        self.task = Some(self.runtime.spawn(async move {
            let start_time = Instant::now();
            let result = match tokio::time::timeout(timeout, load(fetcher, dataset, url)).await {
                Ok(result) => result,
                Err(_) => Err(NGError::Timeout {
                    dataset,
                    after: timeout,
                }),
            };
            debug!(
                "Load {token:?} finished in {}ms, ok: {}",
                start_time.elapsed().as_millis(),
                result.is_ok()
            );
            // The receiver only goes away together with the loader.
            let _ = tx.send(LoadOutcome {
                token,
                dataset,
                result,
            });
        }));
        token
    }

    /// Non-blocking: returns the next completed load that is still current.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        while let Ok(outcome) = self.rx.try_recv() {
            if let Some(accepted) = self.accept(outcome) {
                return Some(accepted);
            }
        }
        None
    }

    /// Waits for the next completed load that is still current.
    pub async fn next_accepted(&mut self) -> Option<LoadOutcome> {
        while let Some(outcome) = self.rx.recv().await {
            if let Some(accepted) = self.accept(outcome) {
                return Some(accepted);
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if outcome.token != self.current {
            debug!(
                "Discarding stale load of {} ({:?}, current {:?})",
                outcome.dataset.label(),
                outcome.token,
                self.current
            );
            return None;
        }

        self.task = None;
        self.state = match &outcome.result {
            Ok(records) => LoadState::Loaded {
                token: outcome.token,
                dataset: outcome.dataset,
                records: records.len(),
            },
            Err(e) => {
                error!("Loading {} failed: {e}", outcome.dataset.label());
                LoadState::Failed {
                    token: outcome.token,
                    dataset: outcome.dataset,
                    reason: e.to_string(),
                }
            }
        };
        Some(outcome)
    }
}

async fn load(
    fetcher: Arc<dyn Fetcher>,
    dataset: DatasetId,
    url: String,
) -> Result<Vec<Record>, NGError> {
    let bytes = fetcher.fetch(dataset, &url).await?;
    tokio::task::spawn_blocking(move || parse_csv(&bytes))
        .await
        .map_err(|e| NGError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::tests::{csv_with_rows, sample_rows};
    use std::collections::HashMap;

    pub const BOYS: &str = "mem://boys.csv";
    pub const GIRLS: &str = "mem://girls.csv";

    /// Serves canned responses after a per url delay.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: HashMap<String, (Duration, Result<Vec<u8>, String>)>,
    }

    impl FakeFetcher {
        pub fn serve(mut self, url: &str, delay_ms: u64, body: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                (Duration::from_millis(delay_ms), Ok(body.as_bytes().to_vec())),
            );
            self
        }

        pub fn fail(mut self, url: &str, delay_ms: u64, reason: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                (Duration::from_millis(delay_ms), Err(reason.to_string())),
            );
            self
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, dataset: DatasetId, url: &str) -> FetchFuture {
            let response = self.responses.get(url).cloned();
            async move {
                match response {
                    Some((delay, body)) => {
                        tokio::time::sleep(delay).await;
                        body.map_err(|reason| NGError::Retrieval { dataset, reason })
                    }
                    None => Err(NGError::Retrieval {
                        dataset,
                        reason: "404 Not Found".into(),
                    }),
                }
            }
            .boxed()
        }
    }

    pub fn boys_csv() -> String {
        csv_with_rows(&sample_rows()[..2])
    }

    pub fn girls_csv() -> String {
        csv_with_rows(&[
            "1.0,Mary,Marie,4138360,2.6,1880,2021,1921,1,0,['M EH1 R IY0'],M,10,2,0,",
            "2.0,Elizabeth,Elisabeth,1638424,3.6,1880,2021,1990,1,0,[],E,0100,4,1,",
            "3.0,Patricia,Patrisha,1572788,4.6,1880,2021,1951,,0,[],P,010,3,1,",
        ])
    }

    pub fn mem_sources() -> Sources {
        Sources::default()
            .with(DatasetId::Boys, BOYS)
            .with(DatasetId::Girls, GIRLS)
    }

    fn loader(fetcher: FakeFetcher, timeout_ms: u64) -> Loader {
        Loader::new(
            Arc::new(fetcher),
            mem_sources(),
            Duration::from_millis(timeout_ms),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn loads_selected_dataset() {
        let fetcher = FakeFetcher::default().serve(BOYS, 10, &boys_csv());
        let mut loader = loader(fetcher, 1000);
        assert_eq!(loader.state(), &LoadState::Idle);

        let token = loader.select(DatasetId::Boys);
        assert_eq!(
            loader.state(),
            &LoadState::Loading {
                token,
                dataset: DatasetId::Boys
            }
        );

        let outcome = loader.next_accepted().await.unwrap();
        assert_eq!(outcome.token, token);
        assert_eq!(outcome.result.unwrap().len(), 2);
        assert_eq!(
            loader.state(),
            &LoadState::Loaded {
                token,
                dataset: DatasetId::Boys,
                records: 2
            }
        );
    }

    #[tokio::test]
    async fn newer_selection_wins_over_slower_older_one() {
        let fetcher = FakeFetcher::default()
            .serve(BOYS, 500, &boys_csv())
            .serve(GIRLS, 50, &girls_csv());
        let mut loader = loader(fetcher, 5000);

        let first = loader.select(DatasetId::Boys);
        let second = loader.select(DatasetId::Girls);
        assert!(second > first);

        let outcome = tokio::time::timeout(Duration::from_secs(2), loader.next_accepted())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.dataset, DatasetId::Girls);
        assert_eq!(outcome.result.unwrap()[0].get("name"), Some("Mary"));

        // Give the superseded request time to finish, it must not show up.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(loader.poll().is_none());
        assert!(matches!(
            loader.state(),
            LoadState::Loaded {
                dataset: DatasetId::Girls,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stale_outcomes_are_discarded() {
        let mut loader = loader(FakeFetcher::default(), 1000);
        let old = loader.select(DatasetId::Boys);
        let current = loader.select(DatasetId::Girls);

        assert!(
            loader
                .accept(LoadOutcome {
                    token: old,
                    dataset: DatasetId::Boys,
                    result: Ok(Vec::new()),
                })
                .is_none()
        );
        assert!(matches!(loader.state(), LoadState::Loading { token, .. } if *token == current));

        let accepted = loader.accept(LoadOutcome {
            token: current,
            dataset: DatasetId::Girls,
            result: Ok(Vec::new()),
        });
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn retrieval_failure_moves_to_failed() {
        let fetcher = FakeFetcher::default().fail(GIRLS, 5, "connection reset");
        let mut loader = loader(fetcher, 1000);
        let token = loader.select(DatasetId::Girls);

        let outcome = loader.next_accepted().await.unwrap();
        assert!(matches!(outcome.result, Err(NGError::Retrieval { .. })));
        match loader.state() {
            LoadState::Failed {
                token: t, reason, ..
            } => {
                assert_eq!(*t, token);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_csv_is_rejected() {
        let fetcher = FakeFetcher::default().serve(BOYS, 1, "rank,name\n1,Liam\n");
        let mut loader = loader(fetcher, 1000);
        loader.select(DatasetId::Boys);
        let outcome = loader.next_accepted().await.unwrap();
        assert!(matches!(outcome.result, Err(NGError::Parse { .. })));
    }

    #[tokio::test]
    async fn hanging_fetch_times_out() {
        let fetcher = FakeFetcher::default().serve(BOYS, 2000, &boys_csv());
        let mut loader = loader(fetcher, 50);
        loader.select(DatasetId::Boys);
        let outcome = loader.next_accepted().await.unwrap();
        assert!(matches!(
            outcome.result,
            Err(NGError::Timeout {
                dataset: DatasetId::Boys,
                ..
            })
        ));
    }

    mod http {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn http_loader(server: &MockServer) -> Loader {
            let sources = Sources::default()
                .with(DatasetId::Boys, format!("{}/boys.csv", server.uri()))
                .with(DatasetId::Girls, format!("{}/girls.csv", server.uri()));
            let timeout = Duration::from_secs(5);
            Loader::new(
                Arc::new(HttpFetcher::new(timeout).unwrap()),
                sources,
                timeout,
                Handle::current(),
            )
        }

        #[tokio::test]
        async fn race_over_http_keeps_latest_selection() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/boys.csv"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(boys_csv())
                        .set_delay(Duration::from_millis(500)),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/girls.csv"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(girls_csv())
                        .set_delay(Duration::from_millis(50)),
                )
                .mount(&server)
                .await;

            let mut loader = http_loader(&server).await;
            loader.select(DatasetId::Boys);
            loader.select(DatasetId::Girls);

            let outcome = loader.next_accepted().await.unwrap();
            assert_eq!(outcome.dataset, DatasetId::Girls);
            assert_eq!(outcome.result.unwrap().len(), 3);

            tokio::time::sleep(Duration::from_millis(600)).await;
            assert!(loader.poll().is_none());
        }

        #[tokio::test]
        async fn http_error_status_is_a_retrieval_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/boys.csv"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let mut loader = http_loader(&server).await;
            loader.select(DatasetId::Boys);
            let outcome = loader.next_accepted().await.unwrap();
            match outcome.result {
                Err(NGError::Retrieval { dataset, reason }) => {
                    assert_eq!(dataset, DatasetId::Boys);
                    assert!(reason.contains("503"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
