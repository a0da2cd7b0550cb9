//! Controller facade.
//!
//! The controller is what a user interface drives. Every network-touching
//! operation is handed to the [`TaskDispatcher`] and runs on a worker while
//! holding the single core lock, so the protocol session only ever sees one
//! operation at a time. Results come back through the caller's
//! [`CompletionQueue`]. The browsing cursor belongs to the primary context:
//! [`Controller::navigate`] changes it without any I/O.
//!
//! ```text
//!  primary context                      blocking worker
//!  ───────────────                      ───────────────
//!  controller.list_entries(q, done) ──► lock core ─► browser ─► session
//!                                                                  │
//!  queue.next().await ◄── done(result) ◄───────────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use protocol::Connector;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::dispatcher::{CompletionQueue, TaskDispatcher};
use crate::error::{ControllerError, DirectoryCreateError, TransferError};
use crate::files::{
    DirectoryBrowser, ListQuery, Listing, TransferDirection, TransferEngine, TransferJob,
    TransferProgress,
};
use crate::path::PathCursor;
use crate::session::{ConnectionManager, Credentials, SessionState};
use crate::shares::{ShareDescriptor, ShareResolver};

/// Cursor movement requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Root,
    Up,
    Enter(String),
}

/// Everything that touches the protocol session.
struct Core {
    manager: ConnectionManager,
    resolver: ShareResolver,
    browser: DirectoryBrowser,
    engine: TransferEngine,
}

fn lock_core<'a>(
    core: &'a Mutex<Core>,
    operation: &str,
) -> Result<MutexGuard<'a, Core>, ControllerError> {
    core.lock().map_err(|_| ControllerError::LockPoisoned {
        context: format!("session core during {}", operation),
    })
}

/// Progress callback that forwards to an optional channel.
fn progress_sink(
    tx: Option<mpsc::UnboundedSender<TransferProgress>>,
    direction: TransferDirection,
    remote_path: String,
) -> impl FnMut(f64) {
    move |percent| {
        if let Some(tx) = &tx {
            let _ = tx.send(TransferProgress {
                direction,
                remote_path: remote_path.clone(),
                percent,
            });
        }
    }
}

/// Session and transfer controller.
pub struct Controller {
    core: Arc<Mutex<Core>>,
    dispatcher: TaskDispatcher,
    cursor: Arc<Mutex<PathCursor>>,
    state: watch::Receiver<SessionState>,
    page_limit: usize,
    default_domain: String,
}

impl Controller {
    /// Build a controller whose operations run on `runtime`.
    ///
    /// The returned queue must be drained by the primary context for
    /// completion callbacks to run.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: &Config,
        runtime: Handle,
    ) -> (Self, CompletionQueue) {
        let manager = ConnectionManager::new(connector, config.connection.timeout());
        let state = manager.subscribe();
        let core = Core {
            manager,
            resolver: ShareResolver::new(config.discovery.candidate_shares.clone()),
            browser: DirectoryBrowser::new(),
            engine: TransferEngine::new(config.transfer.chunk_size),
        };
        let (dispatcher, queue) = TaskDispatcher::new(runtime);

        (
            Self {
                core: Arc::new(Mutex::new(core)),
                dispatcher,
                cursor: Arc::new(Mutex::new(PathCursor::root())),
                state,
                page_limit: config.browse.page_limit,
                default_domain: config.connection.domain.clone(),
            },
            queue,
        )
    }

    /// Current session state, read without the core lock.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe session state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Query with the configured page limit.
    pub fn default_query(&self) -> ListQuery {
        ListQuery::new(self.page_limit)
    }

    /// The browsing cursor.
    pub fn cursor(&self) -> PathCursor {
        lock_cursor(&self.cursor).clone()
    }

    /// Move the cursor. Pure: nothing is sent to the server.
    pub fn navigate(&self, navigation: Navigation) -> PathCursor {
        let mut cursor = lock_cursor(&self.cursor);
        *cursor = match navigation {
            Navigation::Root => PathCursor::root(),
            Navigation::Up => cursor.up(),
            Navigation::Enter(name) => cursor.enter(&name),
        };
        debug!(path = %cursor, "Cursor moved");
        cursor.clone()
    }

    fn dispatch<T, Op, Done>(&self, name: &'static str, operation: Op, on_complete: Done)
    where
        T: Send + 'static,
        Op: FnOnce(&mut Core) -> Result<T, ControllerError> + Send + 'static,
        Done: FnOnce(Result<T, ControllerError>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        self.dispatcher.run(
            name,
            move || {
                let mut core = lock_core(&core, name)?;
                match panic::catch_unwind(AssertUnwindSafe(|| operation(&mut *core))) {
                    Ok(result) => result,
                    Err(payload) => {
                        // The handle may be mid-request; it cannot be reused.
                        error!(operation = name, "Operation panicked, dropping session");
                        core.manager.abandon();
                        drop(core);
                        panic::resume_unwind(payload)
                    }
                }
            },
            move |result| on_complete(result.map_err(ControllerError::from).and_then(|r| r)),
        );
    }

    /// Connect and log in. `None` credentials mean guest access; credentials
    /// without a domain get the configured one.
    pub fn connect<F>(
        &self,
        server_name: &str,
        server_address: &str,
        port: u16,
        credentials: Option<Credentials>,
        on_complete: F,
    ) where
        F: FnOnce(Result<(), ControllerError>) + Send + 'static,
    {
        let server_name = server_name.to_string();
        let server_address = server_address.to_string();
        let credentials = credentials.map(|mut c| {
            if c.domain.is_empty() {
                c.domain = self.default_domain.clone();
            }
            c
        });

        self.dispatch(
            "connect",
            move |core| {
                core.manager
                    .connect(&server_name, &server_address, port, credentials)
                    .map_err(ControllerError::from)
            },
            on_complete,
        );
    }

    /// User-visible shares, probing candidates when enumeration fails.
    pub fn list_shares<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<Vec<ShareDescriptor>, ControllerError>) + Send + 'static,
    {
        self.dispatch(
            "list_shares",
            |core| Ok(core.resolver.list_shares(&mut core.manager)),
            on_complete,
        );
    }

    /// Select a share. On success the cursor returns to the root.
    pub fn select_share<F>(&self, name: &str, on_complete: F)
    where
        F: FnOnce(Result<(), ControllerError>) + Send + 'static,
    {
        let name = name.to_string();
        let cursor = Arc::clone(&self.cursor);

        self.dispatch(
            "select_share",
            move |core| {
                core.resolver
                    .select_share(&mut core.manager, &name)
                    .map_err(ControllerError::from)
            },
            move |result| {
                if result.is_ok() {
                    *lock_cursor(&cursor) = PathCursor::root();
                }
                on_complete(result)
            },
        );
    }

    /// List the directory under the cursor.
    ///
    /// Listing failures degrade to an empty listing; only dispatch failures
    /// are reported as errors.
    pub fn list_entries<F>(&self, query: ListQuery, on_complete: F)
    where
        F: FnOnce(Result<Listing, ControllerError>) + Send + 'static,
    {
        let path = self.cursor();
        self.dispatch(
            "list_entries",
            move |core| Ok(core.browser.list_entries(&mut core.manager, &path, &query)),
            on_complete,
        );
    }

    /// Download `file_name` from the directory under the cursor.
    pub fn download<F>(
        &self,
        file_name: &str,
        local_path: impl Into<PathBuf>,
        progress: Option<mpsc::UnboundedSender<TransferProgress>>,
        on_complete: F,
    ) where
        F: FnOnce(Result<TransferJob, ControllerError>) + Send + 'static,
    {
        let remote = self.cursor().join(file_name);
        let local = local_path.into();

        self.dispatch(
            "download",
            move |core| {
                let on_progress = progress_sink(progress, TransferDirection::Download, remote.clone());
                core.engine
                    .download(&mut core.manager, &remote, &local, on_progress)
                    .map_err(ControllerError::from)
            },
            on_complete,
        );
    }

    /// Upload `local_file` into the directory under the cursor, keeping its name.
    pub fn upload<F>(
        &self,
        local_file: impl AsRef<Path>,
        progress: Option<mpsc::UnboundedSender<TransferProgress>>,
        on_complete: F,
    ) where
        F: FnOnce(Result<TransferJob, ControllerError>) + Send + 'static,
    {
        let local = local_file.as_ref().to_path_buf();
        let cursor = self.cursor();

        self.dispatch(
            "upload",
            move |core| {
                let name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        TransferError::local(
                            &local,
                            std::io::Error::new(
                                std::io::ErrorKind::InvalidInput,
                                "path has no file name",
                            ),
                        )
                    })?;
                let remote = cursor.join(&name);
                let on_progress = progress_sink(progress, TransferDirection::Upload, remote.clone());
                core.engine
                    .upload(&mut core.manager, &local, &remote, on_progress)
                    .map_err(ControllerError::from)
            },
            on_complete,
        );
    }

    /// Create directory `name` under the cursor.
    pub fn create_directory<F>(&self, name: &str, on_complete: F)
    where
        F: FnOnce(Result<(), ControllerError>) + Send + 'static,
    {
        let cursor = self.cursor();
        let name = name.to_string();

        self.dispatch(
            "create_directory",
            move |core| {
                let trimmed = name.trim();
                if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
                    return Err(DirectoryCreateError::InvalidName(name.clone()).into());
                }
                let path = cursor.join(trimmed);
                core.engine
                    .create_directory(&mut core.manager, &path)
                    .map_err(ControllerError::from)
            },
            on_complete,
        );
    }

    /// Log off. Always succeeds for the caller and resets the cursor.
    pub fn disconnect<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<(), ControllerError>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let cursor = Arc::clone(&self.cursor);
        self.dispatcher.run(
            "disconnect",
            move || {
                let mut guard = core.lock().unwrap_or_else(|poisoned| {
                    warn!("Session core poisoned, recovering to disconnect");
                    poisoned.into_inner()
                });
                if panic::catch_unwind(AssertUnwindSafe(|| guard.manager.disconnect())).is_err() {
                    warn!("Logoff panicked, dropping session");
                    guard.manager.abandon();
                }
                drop(guard);
                core.clear_poison();
            },
            move |result| {
                if let Err(e) = result {
                    warn!(error = %e, "Disconnect worker failed");
                }
                *lock_cursor(&cursor) = PathCursor::root();
                on_complete(Ok(()))
            },
        );
    }
}

fn lock_cursor(cursor: &Mutex<PathCursor>) -> MutexGuard<'_, PathCursor> {
    // The cursor is a plain value, a panic cannot leave it half-updated.
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::DispatchError;
    use protocol::{
        Call, FileId, MemoryServer, PathInfo, ProtocolError, ProtocolSession, RawShareInfo, TreeId,
    };
    use tokio::sync::oneshot;

    async fn wait<T: Send + 'static>(
        queue: &mut CompletionQueue,
        issue: impl FnOnce(Box<dyn FnOnce(T) + Send>),
    ) -> T {
        let (tx, rx) = oneshot::channel();
        issue(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        queue.wait_for(rx).await.unwrap()
    }

    fn controller(server: &MemoryServer) -> (Controller, CompletionQueue) {
        Controller::new(Arc::new(server.clone()), &Config::default(), Handle::current())
    }

    #[tokio::test]
    async fn test_navigate_is_pure() {
        let server = MemoryServer::new();
        let (controller, _queue) = controller(&server);

        controller.navigate(Navigation::Enter("a/b".to_string()));
        assert_eq!(controller.cursor().as_str(), "\\a\\b");
        assert_eq!(controller.navigate(Navigation::Up).as_str(), "\\a");
        assert_eq!(controller.navigate(Navigation::Root), PathCursor::root());
        assert!(server.journal().is_empty());
    }

    #[tokio::test]
    async fn test_select_share_resets_cursor() {
        let server = MemoryServer::new().with_share("Public");
        let (controller, mut queue) = controller(&server);

        wait(&mut queue, |done| {
            controller.connect("SERVER", "10.0.0.5", 139, None, done)
        })
        .await
        .unwrap();
        controller.navigate(Navigation::Enter("deep".to_string()));

        wait(&mut queue, |done| controller.select_share("Public", done))
            .await
            .unwrap();

        assert!(controller.cursor().is_root());
        assert_eq!(controller.state(), SessionState::ShareSelected);
    }

    #[tokio::test]
    async fn test_failed_select_keeps_cursor() {
        let server = MemoryServer::new().with_share("Public");
        let (controller, mut queue) = controller(&server);
        wait(&mut queue, |done| {
            controller.connect("SERVER", "10.0.0.5", 139, None, done)
        })
        .await
        .unwrap();
        controller.navigate(Navigation::Enter("deep".to_string()));

        let result = wait(&mut queue, |done| controller.select_share("Nope", done)).await;

        assert!(matches!(result, Err(ControllerError::ShareAccess(_))));
        assert_eq!(controller.cursor().as_str(), "\\deep");
    }

    #[tokio::test]
    async fn test_disconnect_always_succeeds() {
        let server = MemoryServer::new();
        let (controller, mut queue) = controller(&server);
        controller.navigate(Navigation::Enter("x".to_string()));

        wait(&mut queue, |done| controller.disconnect(done))
            .await
            .unwrap();

        assert!(controller.cursor().is_root());
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_create_directory_rejects_dot_names() {
        let server = MemoryServer::new().with_share("Public");
        let (controller, mut queue) = controller(&server);

        let result = wait(&mut queue, |done| controller.create_directory("..", done)).await;

        assert!(matches!(
            result,
            Err(ControllerError::DirectoryCreate(DirectoryCreateError::InvalidName(_)))
        ));
    }

    #[tokio::test]
    async fn test_connect_applies_default_domain() {
        let server = MemoryServer::new().with_account("bob", "pw");
        let mut config = Config::default();
        config.connection.domain = "CORP".to_string();
        let (controller, mut queue) =
            Controller::new(Arc::new(server.clone()), &config, Handle::current());

        wait(&mut queue, |done| {
            controller.connect(
                "SERVER",
                "10.0.0.5",
                139,
                Some(Credentials::new("bob", "pw", "")),
                done,
            )
        })
        .await
        .unwrap();

        assert_eq!(controller.state(), SessionState::Connected);
        assert!(server.journal().contains(&Call::Authenticate {
            username: "bob".to_string(),
            domain: "CORP".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_connect_keeps_explicit_domain() {
        let server = MemoryServer::new().with_account("bob", "pw");
        let mut config = Config::default();
        config.connection.domain = "CORP".to_string();
        let (controller, mut queue) =
            Controller::new(Arc::new(server.clone()), &config, Handle::current());

        wait(&mut queue, |done| {
            controller.connect(
                "SERVER",
                "10.0.0.5",
                139,
                Some(Credentials::new("bob", "pw", "BRANCH")),
                done,
            )
        })
        .await
        .unwrap();

        assert!(server.journal().contains(&Call::Authenticate {
            username: "bob".to_string(),
            domain: "BRANCH".to_string(),
        }));
    }

    /// Backend whose share enumeration panics.
    #[derive(Clone, Default)]
    struct FaultyServer {
        logoffs: Arc<AtomicUsize>,
        panic_on_logoff: bool,
    }

    struct FaultySession {
        server: FaultyServer,
    }

    impl Connector for FaultyServer {
        fn connect(
            &self,
            _server_name: &str,
            _address: &str,
            _port: u16,
            _timeout: Duration,
        ) -> protocol::Result<Box<dyn ProtocolSession>> {
            Ok(Box::new(FaultySession {
                server: self.clone(),
            }))
        }
    }

    fn unsupported<T>() -> protocol::Result<T> {
        Err(ProtocolError::NotSupported("faulty backend".to_string()))
    }

    impl ProtocolSession for FaultySession {
        fn authenticate(&mut self, _: &str, _: &str, _: &str) -> protocol::Result<()> {
            Ok(())
        }
        fn list_shares(&mut self) -> protocol::Result<Vec<RawShareInfo>> {
            panic!("library bug")
        }
        fn connect_tree(&mut self, _: &str) -> protocol::Result<TreeId> {
            unsupported()
        }
        fn disconnect_tree(&mut self, _: TreeId) -> protocol::Result<()> {
            unsupported()
        }
        fn list_path(&mut self, _: &str, _: &str) -> protocol::Result<Vec<PathInfo>> {
            unsupported()
        }
        fn open_file(&mut self, _: TreeId, _: &str) -> protocol::Result<FileId> {
            unsupported()
        }
        fn file_size(&mut self, _: TreeId, _: FileId) -> protocol::Result<u64> {
            unsupported()
        }
        fn read_file(&mut self, _: TreeId, _: FileId, _: u64, _: usize) -> protocol::Result<Vec<u8>> {
            unsupported()
        }
        fn close_file(&mut self, _: TreeId, _: FileId) -> protocol::Result<()> {
            unsupported()
        }
        fn create_file(&mut self, _: TreeId, _: &str) -> protocol::Result<FileId> {
            unsupported()
        }
        fn write_file(&mut self, _: TreeId, _: FileId, _: &[u8]) -> protocol::Result<usize> {
            unsupported()
        }
        fn create_directory(&mut self, _: &str, _: &str) -> protocol::Result<()> {
            unsupported()
        }
        fn logoff(&mut self) -> protocol::Result<()> {
            if self.server.panic_on_logoff {
                panic!("logoff bug");
            }
            self.server.logoffs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn connect_faulty(controller: &Controller, queue: &mut CompletionQueue) {
        wait(queue, |done| {
            controller.connect("SERVER", "10.0.0.5", 139, None, done)
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_operation_drops_session() {
        let server = FaultyServer::default();
        let (controller, mut queue) =
            Controller::new(Arc::new(server.clone()), &Config::default(), Handle::current());
        connect_faulty(&controller, &mut queue).await;

        let result = wait(&mut queue, |done| controller.list_shares(done)).await;

        assert!(matches!(
            result,
            Err(ControllerError::Dispatch(DispatchError::Panicked(ref m))) if m == "library bug"
        ));
        assert_eq!(controller.state(), SessionState::Disconnected);

        wait(&mut queue, |done| controller.disconnect(done))
            .await
            .unwrap();
        assert_eq!(server.logoffs.load(Ordering::SeqCst), 0);

        // The core stays usable: a fresh session can be opened and closed.
        connect_faulty(&controller, &mut queue).await;
        assert_eq!(controller.state(), SessionState::Connected);
        wait(&mut queue, |done| controller.disconnect(done))
            .await
            .unwrap();
        assert_eq!(server.logoffs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_recovers_poisoned_core() {
        let server = FaultyServer::default();
        let (controller, mut queue) =
            Controller::new(Arc::new(server.clone()), &Config::default(), Handle::current());
        connect_faulty(&controller, &mut queue).await;

        let core = Arc::clone(&controller.core);
        std::thread::spawn(move || {
            let _guard = core.lock().unwrap();
            panic!("poison the core");
        })
        .join()
        .unwrap_err();
        assert!(controller.core.is_poisoned());

        let shares = wait(&mut queue, |done| controller.list_shares(done)).await;
        assert!(matches!(shares, Err(ControllerError::LockPoisoned { .. })));

        wait(&mut queue, |done| controller.disconnect(done))
            .await
            .unwrap();

        assert_eq!(controller.state(), SessionState::Disconnected);
        assert_eq!(server.logoffs.load(Ordering::SeqCst), 1);
        assert!(!controller.core.is_poisoned());
        connect_faulty(&controller, &mut queue).await;
        assert_eq!(controller.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_panicking_logoff_still_disconnects() {
        let server = FaultyServer {
            panic_on_logoff: true,
            ..FaultyServer::default()
        };
        let (controller, mut queue) =
            Controller::new(Arc::new(server), &Config::default(), Handle::current());
        connect_faulty(&controller, &mut queue).await;

        let result = wait(&mut queue, |done| controller.disconnect(done)).await;

        assert!(result.is_ok());
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert!(!controller.core.is_poisoned());
    }
}
