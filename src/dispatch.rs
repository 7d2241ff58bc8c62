//! Event dispatch between pages and controllers
//!
//! Stands in for the hosting environment: pages register a controller for
//! a scope, lifecycle events are routed to it as messages, and fetches from
//! controlled pages go through the active controller. Only pages whose URL
//! path lies under the scope can be controlled. Pages that no controller
//! claims talk to the network directly.

use crate::config::schema::ControllerConfig;
use crate::controller::{
    ActivationReport, ControllerState, InstallReport, OfflineCacheController, ResponseSource, Served,
};
use crate::error::{CampusError, CampusResult};
use crate::fetch::Fetcher;
use crate::http::Request;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of an open page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Messages routed to controllers
#[derive(Debug, Clone)]
pub enum Event {
    /// Precache the installing controller's manifest
    Install,
    /// Promote the installing controller and claim open pages
    Activate,
    /// A request issued by a page
    Fetch { client: ClientId, request: Request },
}

/// Result of dispatching an event
#[derive(Debug, Clone)]
pub enum Outcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(Served),
}

/// An open page and the controller controlling it
#[derive(Debug, Clone)]
struct Page {
    path: String,
    controller: Option<Uuid>,
}

#[derive(Default)]
struct Registration {
    installing: Option<Arc<OfflineCacheController>>,
    active: Option<Arc<OfflineCacheController>>,
    clients: HashMap<ClientId, Page>,
    next_client: u64,
}

/// Registration and routing for one scope
pub struct Dispatcher {
    scope: String,
    network: Arc<dyn Fetcher>,
    registration: Mutex<Registration>,
}

impl Dispatcher {
    /// Create a dispatcher for `scope`; uncontrolled traffic uses `network`
    pub fn new(scope: &str, network: Arc<dyn Fetcher>) -> CampusResult<Self> {
        if !scope.starts_with('/') {
            return Err(CampusError::InvalidScope(scope.to_string()));
        }

        Ok(Self {
            scope: scope.to_string(),
            network,
            registration: Mutex::new(Registration::default()),
        })
    }

    /// Dispatcher for the `[controller]` scope
    pub fn from_config(
        config: &ControllerConfig,
        network: Arc<dyn Fetcher>,
    ) -> CampusResult<Self> {
        Self::new(&config.scope, network)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Whether a page at `path` falls under this scope
    pub fn in_scope(&self, path: &str) -> bool {
        path.starts_with(&self.scope)
    }

    fn lock(&self) -> MutexGuard<'_, Registration> {
        self.registration
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The controller currently serving fetches, if any
    pub fn active(&self) -> Option<Arc<OfflineCacheController>> {
        self.lock().active.clone()
    }

    /// Open a page at `path`
    ///
    /// An in-scope page is controlled by the active controller, if any.
    pub fn open_page(&self, path: &str) -> ClientId {
        let in_scope = self.in_scope(path);
        let mut reg = self.lock();
        let id = ClientId(reg.next_client);
        reg.next_client += 1;
        let controller = reg.active.as_ref().filter(|_| in_scope).map(|c| c.id());
        reg.clients.insert(
            id,
            Page {
                path: path.to_string(),
                controller,
            },
        );
        debug!("Opened {} at {} (controlled: {})", id, path, controller.is_some());
        id
    }

    /// Close a page
    pub fn close_page(&self, client: ClientId) {
        self.lock().clients.remove(&client);
    }

    /// Controller id controlling a page
    pub fn controller_of(&self, client: ClientId) -> Option<Uuid> {
        self.lock().clients.get(&client).and_then(|page| page.controller)
    }

    /// Open a page at `path` and register `controller` for the scope
    ///
    /// Registration failure is logged; the page still loads and its
    /// requests go to the network.
    pub async fn load_page(
        &self,
        path: &str,
        controller: Arc<OfflineCacheController>,
    ) -> ClientId {
        let client = self.open_page(path);
        if let Err(e) = self.register(controller).await {
            warn!("Offline cache registration failed for {}: {}", self.scope, e);
        }
        client
    }

    /// Register a controller version for this scope
    ///
    /// A version that is already active is left alone. Otherwise the
    /// controller installs and, since install skips waiting, activates
    /// immediately and claims every open page.
    pub async fn register(&self, controller: Arc<OfflineCacheController>) -> CampusResult<()> {
        {
            let mut reg = self.lock();
            if let Some(active) = &reg.active {
                if active.version() == controller.version() {
                    debug!("{} already active for {}", controller.version(), self.scope);
                    return Ok(());
                }
            }
            reg.installing = Some(controller);
        }

        let report = match self.dispatch(Event::Install).await? {
            Outcome::Installed(report) => report,
            other => return Err(CampusError::Internal(format!("unexpected install outcome: {other:?}"))),
        };

        if report.skip_waiting {
            self.dispatch(Event::Activate).await?;
        }
        Ok(())
    }

    /// Make `controller` active without install or activate events
    ///
    /// For a controller whose generation was installed by an earlier
    /// process. Open in-scope pages are claimed.
    pub fn adopt(&self, controller: Arc<OfflineCacheController>) {
        let mut reg = self.lock();
        Self::claim(&mut reg, &self.scope, controller.id());
        debug!("Adopted {} for {}", controller.version(), self.scope);
        reg.active = Some(controller);
    }

    fn claim(reg: &mut Registration, scope: &str, controller: Uuid) {
        for page in reg.clients.values_mut().filter(|page| page.path.starts_with(scope)) {
            page.controller = Some(controller);
        }
    }

    /// Route one event to its handler
    pub async fn dispatch(&self, event: Event) -> CampusResult<Outcome> {
        match event {
            Event::Install => self.on_install().await.map(Outcome::Installed),
            Event::Activate => self.on_activate().await.map(Outcome::Activated),
            Event::Fetch { client, request } => self.fetch(client, &request).await.map(Outcome::Response),
        }
    }

    async fn on_install(&self) -> CampusResult<InstallReport> {
        let controller = self
            .lock()
            .installing
            .clone()
            .ok_or_else(|| CampusError::User("no controller is installing".to_string()))?;

        match controller.install().await {
            Ok(report) => Ok(report),
            Err(e) => {
                let mut reg = self.lock();
                if reg.installing.as_ref().is_some_and(|c| c.id() == controller.id()) {
                    reg.installing = None;
                }
                Err(e)
            }
        }
    }

    async fn on_activate(&self) -> CampusResult<ActivationReport> {
        let controller = self
            .lock()
            .installing
            .clone()
            .ok_or_else(|| CampusError::User("no installed controller to activate".to_string()))?;

        let report = controller.activate().await?;

        let previous = {
            let mut reg = self.lock();
            reg.installing = None;
            let previous = reg.active.replace(Arc::clone(&controller));
            Self::claim(&mut reg, &self.scope, controller.id());
            previous
        };

        if let Some(previous) = previous {
            if previous.state() == ControllerState::Active {
                previous.supersede()?;
            }
        }

        info!("{} now controls {}", controller.version(), self.scope);
        Ok(report)
    }

    /// Issue a request on behalf of a page
    pub async fn fetch(&self, client: ClientId, request: &Request) -> CampusResult<Served> {
        let controller = {
            let reg = self.lock();
            let owner = reg.clients.get(&client).and_then(|page| page.controller);
            reg.active.clone().filter(|active| Some(active.id()) == owner)
        };

        match controller {
            Some(controller) => controller.handle_fetch(request).await,
            None => {
                debug!("Uncontrolled fetch from {}: {}", client, request.url);
                let response = self.network.fetch(request).await?;
                Ok(Served::new(response, ResponseSource::Passthrough))
            }
        }
    }
}
