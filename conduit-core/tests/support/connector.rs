//! Scriptable connector implementation shared by the coordinator tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conduit_core::spi::{
    self, AuthenticationIdentity, AuthenticationManager,
    AuthenticationResponse, AuthorizationManager,
    ConfigMap, ConfigureResponse, Connector, ConnectorFactory, ConnectorType,
    Document, DocumentList, Locale, RepositoryError, Session, ShutdownAware,
    TraversalManager,
};

/// Counters shared by a connector type and every connector it builds.
#[derive(Debug, Default)]
pub struct Ledger {
    pub instantiated: AtomicUsize,
    pub logins: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub deletes: AtomicUsize,
    pub configs: Mutex<Vec<ConfigMap>>,
    panic_next_traversal: AtomicBool,
}

impl Ledger {
    pub fn instantiated(&self) -> usize {
        self.instantiated.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<ConfigMap> {
        self.configs.lock().unwrap().last().cloned()
    }
}

/// What `validate_config` answers.
#[derive(Clone, Debug, Default)]
pub enum Verdict {
    #[default]
    Accept,
    Reject(String),
    Form(String),
    Substitute(ConfigMap),
    Fail,
}

#[derive(Debug)]
pub struct FakeConnectorType {
    pub ledger: Arc<Ledger>,
    verdict: Mutex<Verdict>,
    probe: AtomicBool,
    fail_instantiate: AtomicBool,
    fail_traversal: AtomicBool,
    documents: usize,
}

impl FakeConnectorType {
    pub fn new(documents: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger::default()),
            verdict: Mutex::new(Verdict::Accept),
            probe: AtomicBool::new(false),
            fail_instantiate: AtomicBool::new(false),
            fail_traversal: AtomicBool::new(false),
            documents,
        }
    }

    pub fn set_verdict(&self, verdict: Verdict) {
        *self.verdict.lock().unwrap() = verdict;
    }

    /// Build a trial connector through the factory during validation.
    pub fn set_probe(&self, probe: bool) {
        self.probe.store(probe, Ordering::SeqCst);
    }

    pub fn set_fail_instantiate(&self, fail: bool) {
        self.fail_instantiate.store(fail, Ordering::SeqCst);
    }

    /// The next traversal started or resumed by any connector of this type
    /// panics.
    pub fn panic_next_traversal(&self) {
        self.ledger.panic_next_traversal.store(true, Ordering::SeqCst);
    }

    /// Sessions of connectors built from now on refuse to traverse.
    pub fn set_fail_traversal(&self, fail: bool) {
        self.fail_traversal.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectorType for FakeConnectorType {
    async fn validate_config(
        &self,
        config: &ConfigMap,
        _locale: &Locale,
        factory: &dyn ConnectorFactory,
    ) -> spi::Result<Option<ConfigureResponse>> {
        if self.probe.load(Ordering::SeqCst) {
            let trial = factory.make_connector(Some(config)).await?;
            trial.login().await?;
        }
        let verdict = self.verdict.lock().unwrap().clone();
        match verdict {
            Verdict::Accept => Ok(None),
            Verdict::Reject(message) => {
                Ok(Some(ConfigureResponse::rejected(message, None)))
            }
            Verdict::Form(snippet) => {
                Ok(Some(ConfigureResponse::form(snippet)))
            }
            Verdict::Substitute(map) => {
                Ok(Some(ConfigureResponse::substitute(map)))
            }
            Verdict::Fail => {
                Err(RepositoryError::Other("validator crashed".into()))
            }
        }
    }

    async fn populated_config_form(
        &self,
        config: &ConfigMap,
        _locale: &Locale,
    ) -> spi::Result<ConfigureResponse> {
        let snippet = config
            .iter()
            .map(|(key, value)| {
                format!("<input name=\"{key}\" value=\"{value}\"/>")
            })
            .collect::<String>();
        Ok(ConfigureResponse::form(snippet))
    }

    async fn instantiate(
        &self,
        config: &ConfigMap,
    ) -> spi::Result<Arc<dyn Connector>> {
        if self.fail_instantiate.load(Ordering::SeqCst) {
            return Err(RepositoryError::Other("bad connector".into()));
        }
        self.ledger.instantiated.fetch_add(1, Ordering::SeqCst);
        self.ledger.configs.lock().unwrap().push(config.clone());
        Ok(Arc::new(FakeConnector {
            ledger: Arc::clone(&self.ledger),
            documents: self.documents,
            fail_traversal: self.fail_traversal.load(Ordering::SeqCst),
        }))
    }
}

struct FakeConnector {
    ledger: Arc<Ledger>,
    documents: usize,
    fail_traversal: bool,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn login(&self) -> spi::Result<Arc<dyn Session>> {
        self.ledger.logins.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            ledger: Arc::clone(&self.ledger),
            documents: self.documents,
            fail_traversal: self.fail_traversal,
        }))
    }

    fn shutdown_aware(&self) -> Option<&dyn ShutdownAware> {
        Some(self)
    }
}

#[async_trait]
impl ShutdownAware for FakeConnector {
    async fn shutdown(&self) -> spi::Result<()> {
        self.ledger.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> spi::Result<()> {
        self.ledger.deletes.fetch_add(1, Ordering::SeqCst);
        // Deletion problems must not stop removal.
        Err(RepositoryError::Other("repository already gone".into()))
    }
}

struct FakeSession {
    ledger: Arc<Ledger>,
    documents: usize,
    fail_traversal: bool,
}

impl Session for FakeSession {
    fn authentication_manager(&self) -> Option<Arc<dyn AuthenticationManager>> {
        Some(Arc::new(PasswordAuthn))
    }

    fn authorization_manager(&self) -> Option<Arc<dyn AuthorizationManager>> {
        None
    }

    fn traversal_manager(&self) -> spi::Result<Arc<dyn TraversalManager>> {
        if self.fail_traversal {
            return Err(RepositoryError::Login("traversal disabled".into()));
        }
        Ok(Arc::new(CountingTraversal {
            ledger: Arc::clone(&self.ledger),
            documents: self.documents,
        }))
    }
}

struct PasswordAuthn;

#[async_trait]
impl AuthenticationManager for PasswordAuthn {
    async fn authenticate(
        &self,
        identity: &AuthenticationIdentity,
    ) -> spi::Result<AuthenticationResponse> {
        Ok(AuthenticationResponse {
            valid: identity.password.as_deref() == Some("secret"),
            groups: Vec::new(),
        })
    }
}

/// Serves `doc-0..doc-{documents}`; checkpoints are `ck<next index>`.
struct CountingTraversal {
    ledger: Arc<Ledger>,
    documents: usize,
}

impl CountingTraversal {
    fn maybe_panic(&self) {
        if self.ledger.panic_next_traversal.swap(false, Ordering::SeqCst) {
            panic!("traversal blew up");
        }
    }
}

#[async_trait]
impl TraversalManager for CountingTraversal {
    async fn start_traversal(
        &self,
    ) -> spi::Result<Option<Box<dyn DocumentList>>> {
        self.maybe_panic();
        Ok(Some(Box::new(CountingList {
            next: 0,
            end: self.documents,
        })))
    }

    async fn resume_traversal(
        &self,
        checkpoint: &str,
    ) -> spi::Result<Option<Box<dyn DocumentList>>> {
        self.maybe_panic();
        let next = checkpoint
            .strip_prefix("ck")
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| {
                RepositoryError::Other(format!("bad checkpoint {checkpoint}"))
            })?;
        Ok(Some(Box::new(CountingList {
            next,
            end: self.documents,
        })))
    }
}

struct CountingList {
    next: usize,
    end: usize,
}

#[async_trait]
impl DocumentList for CountingList {
    async fn next_document(&mut self) -> spi::Result<Option<Document>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let document = Document::new(format!("doc-{}", self.next));
        self.next += 1;
        Ok(Some(document))
    }

    async fn checkpoint(&mut self) -> spi::Result<Option<String>> {
        Ok(Some(format!("ck{}", self.next)))
    }
}
