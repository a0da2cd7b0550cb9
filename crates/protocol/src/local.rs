//! Loopback backend that serves directories of this machine as shares.
//!
//! Every remote path is resolved against the share root and validated so
//! that it cannot leave it: `.` and `..` segments are rejected outright and
//! existing paths are canonicalized and checked against the canonical root,
//! which also catches symlinks pointing outside the share.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::session::{Connector, ProtocolSession};
use crate::types::{
    segments, split_pattern, wildcard_match, FileId, PathInfo, RawShareInfo, TreeId,
    SHARE_SPECIAL, SHARE_TYPE_DISK, SHARE_TYPE_IPC,
};

/// Interprocess share advertised next to the disk shares.
const IPC_SHARE: &str = "IPC$";

/// A local directory exported under a share name.
#[derive(Debug, Clone)]
pub struct LocalShare {
    /// Share name as clients see it.
    pub name: String,
    /// Directory the share maps to.
    pub root: PathBuf,
    /// Reject file creation and directory creation.
    pub read_only: bool,
}

/// Loopback share server.
#[derive(Debug, Clone, Default)]
pub struct LocalServer {
    shares: Vec<LocalShare>,
    /// Required username/password. `None` accepts any login, including guest.
    account: Option<(String, String)>,
}

impl LocalServer {
    /// Server with no shares and guest access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `root` as a writable share.
    pub fn with_share(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.shares.push(LocalShare {
            name: name.into(),
            root: root.into(),
            read_only: false,
        });
        self
    }

    /// Export `root` as a read-only share.
    pub fn with_read_only_share(
        mut self,
        name: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Self {
        self.shares.push(LocalShare {
            name: name.into(),
            root: root.into(),
            read_only: true,
        });
        self
    }

    /// Require this account and disable guest access.
    pub fn with_account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.account = Some((username.into(), password.into()));
        self
    }

    /// Exported shares.
    pub fn shares(&self) -> &[LocalShare] {
        &self.shares
    }
}

impl Connector for LocalServer {
    fn connect(
        &self,
        server_name: &str,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn ProtocolSession>> {
        if address.trim().is_empty() {
            return Err(ProtocolError::ConnectionFailed(
                "server address is empty".to_string(),
            ));
        }

        debug!(
            server = server_name,
            address,
            port,
            timeout_secs = timeout.as_secs(),
            shares = self.shares.len(),
            "Opening loopback session"
        );

        Ok(Box::new(LocalSession::new(Arc::new(self.clone()))))
    }
}

/// What a tree id is attached to.
#[derive(Debug, Clone, Copy)]
enum TreeTarget {
    Share(usize),
    Ipc,
}

struct OpenFile {
    tree: TreeId,
    file: File,
}

/// Session on a [`LocalServer`].
pub struct LocalSession {
    server: Arc<LocalServer>,
    authenticated: bool,
    logged_off: bool,
    trees: HashMap<TreeId, TreeTarget>,
    files: HashMap<FileId, OpenFile>,
    next_id: u16,
}

impl LocalSession {
    fn new(server: Arc<LocalServer>) -> Self {
        Self {
            server,
            authenticated: false,
            logged_off: false,
            trees: HashMap::new(),
            files: HashMap::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> u16 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.logged_off {
            return Err(ProtocolError::LoggedOff);
        }
        if !self.authenticated {
            return Err(ProtocolError::NotAuthenticated);
        }
        Ok(())
    }

    fn find_share(&self, name: &str) -> Result<usize> {
        self.server
            .shares
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ProtocolError::BadNetworkName(name.to_string()))
    }

    fn tree_share(&self, tree: TreeId) -> Result<usize> {
        match self.trees.get(&tree) {
            Some(TreeTarget::Share(idx)) => Ok(*idx),
            Some(TreeTarget::Ipc) => Err(ProtocolError::AccessDenied(format!(
                "{} does not hold files",
                IPC_SHARE
            ))),
            None => Err(ProtocolError::InvalidHandle(tree.to_string())),
        }
    }

    fn open_file_mut(&mut self, tree: TreeId, file: FileId) -> Result<&mut File> {
        match self.files.get_mut(&file) {
            Some(open) if open.tree == tree => Ok(&mut open.file),
            _ => Err(ProtocolError::InvalidHandle(format!("{} on {}", file, tree))),
        }
    }

    /// Map a remote path onto the share root, refusing anything that escapes it.
    fn resolve(&self, share_idx: usize, remote: &str) -> Result<PathBuf> {
        let share = &self.server.shares[share_idx];
        let mut local = share.root.clone();

        for segment in segments(remote) {
            if segment == "." || segment == ".." || segment.contains(':') {
                return Err(ProtocolError::InvalidPath(remote.to_string()));
            }
            local.push(segment);
        }

        let root = fs::canonicalize(&share.root).map_err(|e| {
            ProtocolError::Io(format!(
                "share root {} unavailable: {}",
                share.root.display(),
                e
            ))
        })?;

        // Paths that do not exist yet are checked through their parent.
        let probe: &Path = if local.exists() {
            &local
        } else {
            local.parent().unwrap_or(share.root.as_path())
        };

        if let Ok(canonical) = fs::canonicalize(probe) {
            if !canonical.starts_with(&root) {
                return Err(ProtocolError::AccessDenied(format!(
                    "{} is outside share {}",
                    remote, share.name
                )));
            }
        }

        Ok(local)
    }

    fn ensure_writable(&self, share_idx: usize) -> Result<()> {
        let share = &self.server.shares[share_idx];
        if share.read_only {
            return Err(ProtocolError::AccessDenied(format!(
                "share {} is read-only",
                share.name
            )));
        }
        Ok(())
    }
}

impl ProtocolSession for LocalSession {
    fn authenticate(&mut self, username: &str, password: &str, _domain: &str) -> Result<()> {
        if self.logged_off {
            return Err(ProtocolError::LoggedOff);
        }

        if let Some((user, pass)) = &self.server.account {
            if username.is_empty() {
                return Err(ProtocolError::AuthenticationFailed(
                    "guest access is disabled".to_string(),
                ));
            }
            if username != user || password != pass {
                return Err(ProtocolError::AuthenticationFailed(format!(
                    "logon failure for {}",
                    username
                )));
            }
        }

        self.authenticated = true;
        Ok(())
    }

    fn list_shares(&mut self) -> Result<Vec<RawShareInfo>> {
        self.ensure_ready()?;

        let mut shares: Vec<RawShareInfo> = self
            .server
            .shares
            .iter()
            .map(|s| RawShareInfo {
                name: format!("{}\0", s.name),
                raw_flags: SHARE_TYPE_DISK,
            })
            .collect();
        shares.push(RawShareInfo {
            name: format!("{}\0", IPC_SHARE),
            raw_flags: SHARE_TYPE_IPC | SHARE_SPECIAL,
        });

        Ok(shares)
    }

    fn connect_tree(&mut self, share: &str) -> Result<TreeId> {
        self.ensure_ready()?;

        let target = if share.eq_ignore_ascii_case(IPC_SHARE) {
            TreeTarget::Ipc
        } else {
            TreeTarget::Share(self.find_share(share)?)
        };

        let tree = TreeId(self.allocate_id());
        self.trees.insert(tree, target);
        Ok(tree)
    }

    fn disconnect_tree(&mut self, tree: TreeId) -> Result<()> {
        self.ensure_ready()?;

        if self.trees.remove(&tree).is_none() {
            return Err(ProtocolError::InvalidHandle(tree.to_string()));
        }
        // Files still open on the tree are closed with it.
        self.files.retain(|_, open| open.tree != tree);
        Ok(())
    }

    fn list_path(&mut self, share: &str, pattern: &str) -> Result<Vec<PathInfo>> {
        self.ensure_ready()?;

        if share.eq_ignore_ascii_case(IPC_SHARE) {
            return Err(ProtocolError::AccessDenied(format!(
                "{} cannot be searched",
                IPC_SHARE
            )));
        }
        let share_idx = self.find_share(share)?;
        let (dir, mask) = split_pattern(pattern);
        let dir_path = self.resolve(share_idx, dir)?;

        let metadata = fs::metadata(&dir_path)
            .map_err(|_| ProtocolError::NotFound(dir.to_string()))?;
        if !metadata.is_dir() {
            return Err(ProtocolError::NotFound(dir.to_string()));
        }

        let mut results = Vec::new();
        for special in [".", ".."] {
            if wildcard_match(mask, special) {
                results.push(PathInfo::directory(special));
            }
        }

        for entry_result in fs::read_dir(&dir_path)? {
            let entry = match entry_result {
                Ok(e) => e,
                Err(_) => continue, // Skip entries we can't read
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if !wildcard_match(mask, &name) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue, // Skip entries we can't stat
            };

            results.push(if metadata.is_dir() {
                PathInfo::directory(name)
            } else {
                PathInfo::file(name, metadata.len())
            });
        }

        Ok(results)
    }

    fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        self.ensure_ready()?;

        let share_idx = self.tree_share(tree)?;
        let local = self.resolve(share_idx, path)?;
        if local.is_dir() {
            return Err(ProtocolError::AccessDenied(format!(
                "{} is a directory",
                path
            )));
        }

        let file = File::open(&local)?;
        let id = FileId(self.allocate_id());
        self.files.insert(id, OpenFile { tree, file });
        Ok(id)
    }

    fn file_size(&mut self, tree: TreeId, file: FileId) -> Result<u64> {
        self.ensure_ready()?;
        let handle = self.open_file_mut(tree, file)?;
        Ok(handle.metadata()?.len())
    }

    fn read_file(
        &mut self,
        tree: TreeId,
        file: FileId,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        self.ensure_ready()?;

        let handle = self.open_file_mut(tree, file)?;
        handle.seek(SeekFrom::Start(offset))?;

        let mut buffer = Vec::with_capacity(length);
        handle.take(length as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn close_file(&mut self, tree: TreeId, file: FileId) -> Result<()> {
        self.ensure_ready()?;

        match self.files.get(&file) {
            Some(open) if open.tree == tree => {
                self.files.remove(&file);
                Ok(())
            }
            _ => Err(ProtocolError::InvalidHandle(format!("{} on {}", file, tree))),
        }
    }

    fn create_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        self.ensure_ready()?;

        let share_idx = self.tree_share(tree)?;
        self.ensure_writable(share_idx)?;
        let local = self.resolve(share_idx, path)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)?;

        let id = FileId(self.allocate_id());
        self.files.insert(id, OpenFile { tree, file });
        Ok(id)
    }

    fn write_file(&mut self, tree: TreeId, file: FileId, data: &[u8]) -> Result<usize> {
        self.ensure_ready()?;

        let handle = self.open_file_mut(tree, file)?;
        handle.write_all(data)?;
        Ok(data.len())
    }

    fn create_directory(&mut self, share: &str, path: &str) -> Result<()> {
        self.ensure_ready()?;

        let share_idx = self.find_share(share)?;
        self.ensure_writable(share_idx)?;
        let local = self.resolve(share_idx, path)?;
        fs::create_dir(&local)?;
        Ok(())
    }

    fn logoff(&mut self) -> Result<()> {
        if self.logged_off {
            return Err(ProtocolError::LoggedOff);
        }
        self.files.clear();
        self.trees.clear();
        self.authenticated = false;
        self.logged_off = true;
        Ok(())
    }
}
