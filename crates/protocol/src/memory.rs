//! In-memory share server with scriptable failure modes.
//!
//! `MemoryServer` is cheap to clone; clones share the same state, so a test
//! can hand one clone to the code under test and keep another to inspect the
//! call journal and the resulting share contents.
//!
//! Paths are case-sensitive and stored without the leading separator
//! (`docs\report.pdf`). Share names are matched case-insensitively.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::{ProtocolError, Result};
use crate::session::{Connector, ProtocolSession};
use crate::types::{
    segments, split_pattern, wildcard_match, FileId, PathInfo, RawShareInfo, TreeId,
    SHARE_SPECIAL, SHARE_TYPE_DISK, SHARE_TYPE_IPC,
};

/// How the server answers share enumeration requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enumeration {
    /// Return every share.
    #[default]
    Allowed,
    /// Fail with access denied, as servers with restricted enumeration do.
    Denied,
    /// Succeed with an empty list.
    Empty,
}

/// One request received by the server, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { address: String, port: u16 },
    Authenticate { username: String, domain: String },
    ListShares,
    TreeConnect { share: String },
    TreeDisconnect { tree: TreeId },
    ListPath { share: String, pattern: String },
    OpenFile { path: String },
    ReadFile { offset: u64, length: usize },
    CloseFile,
    CreateFile { path: String },
    WriteFile { bytes: usize },
    CreateDirectory { share: String, path: String },
    Logoff,
}

#[derive(Debug, Clone, Default)]
struct Share {
    name: String,
    read_only: bool,
    locked: bool,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    shares: Vec<Share>,
    enumeration: Enumeration,
    account: Option<(String, String)>,
    refuse_reason: Option<String>,
    severed: bool,
    connect_latency: Duration,
    call_latency: Duration,
    read_failures: HashMap<(String, String), u64>,
    early_eof: HashMap<(String, String), u64>,
    sizes_hidden: bool,
    journal: Vec<Call>,
    open_trees: usize,
    max_open_trees: usize,
}

impl State {
    fn share_index(&self, name: &str) -> Result<usize> {
        self.shares
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ProtocolError::BadNetworkName(name.to_string()))
    }

    fn share_mut(&mut self, name: &str) -> &mut Share {
        match self.share_index(name) {
            Ok(idx) => &mut self.shares[idx],
            Err(_) => {
                self.shares.push(Share {
                    name: name.to_string(),
                    ..Share::default()
                });
                let last = self.shares.len() - 1;
                &mut self.shares[last]
            }
        }
    }
}

/// Normalize a remote path into a map key.
fn key(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("\\")
}

fn parent_key(key: &str) -> &str {
    key.rsplit_once('\\').map(|(parent, _)| parent).unwrap_or("")
}

fn leaf_name(key: &str) -> &str {
    key.rsplit_once('\\').map(|(_, leaf)| leaf).unwrap_or(key)
}

/// Scriptable in-memory share server.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<State>>,
}

impl MemoryServer {
    /// Server with no shares, open enumeration and guest access.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the journal from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a writable share.
    pub fn with_share(self, name: &str) -> Self {
        self.lock().share_mut(name);
        self
    }

    /// Add a share that rejects writes.
    pub fn with_read_only_share(self, name: &str) -> Self {
        self.lock().share_mut(name).read_only = true;
        self
    }

    /// Add a share that is enumerated but refuses tree connects.
    pub fn with_locked_share(self, name: &str) -> Self {
        self.lock().share_mut(name).locked = true;
        self
    }

    /// Add a directory (and its parents) to a share, creating the share if needed.
    pub fn with_directory(self, share: &str, path: &str) -> Self {
        {
            let mut state = self.lock();
            let share = state.share_mut(share);
            let mut current = String::new();
            for segment in segments(path) {
                if !current.is_empty() {
                    current.push('\\');
                }
                current.push_str(segment);
                share.dirs.insert(current.clone());
            }
        }
        self
    }

    /// Add a file (and its parent directories) to a share.
    pub fn with_file(self, share: &str, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let file_key = key(path);
        let parent = parent_key(&file_key).to_string();
        let this = if parent.is_empty() {
            self.with_share(share)
        } else {
            self.with_directory(share, &parent)
        };
        this.lock()
            .share_mut(share)
            .files
            .insert(file_key, contents.into());
        this
    }

    /// Require this account and disable guest access.
    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.lock().account = Some((username.to_string(), password.to_string()));
        self
    }

    /// Control share enumeration.
    pub fn with_enumeration(self, enumeration: Enumeration) -> Self {
        self.lock().enumeration = enumeration;
        self
    }

    /// Refuse every transport connection.
    pub fn refusing_connections(self, reason: &str) -> Self {
        self.lock().refuse_reason = Some(reason.to_string());
        self
    }

    /// Delay transport setup. Latency at or above the caller's timeout fails
    /// the connect with [`ProtocolError::Timeout`].
    pub fn with_connect_latency(self, latency: Duration) -> Self {
        self.lock().connect_latency = latency;
        self
    }

    /// Delay every tree connect and read.
    pub fn with_call_latency(self, latency: Duration) -> Self {
        self.lock().call_latency = latency;
        self
    }

    /// Fail reads of `path` at or beyond `offset`.
    pub fn failing_reads_at(self, share: &str, path: &str, offset: u64) -> Self {
        self.lock()
            .read_failures
            .insert((share.to_lowercase(), key(path)), offset);
        self
    }

    /// Return empty reads for `path` from `offset` on, while still reporting
    /// the full file size.
    pub fn ending_reads_at(self, share: &str, path: &str, offset: u64) -> Self {
        self.lock()
            .early_eof
            .insert((share.to_lowercase(), key(path)), offset);
        self
    }

    /// Make file size queries fail.
    pub fn hiding_file_sizes(self) -> Self {
        self.lock().sizes_hidden = true;
        self
    }

    /// Drop the connection: every later request on any session fails with
    /// [`ProtocolError::ConnectionClosed`].
    pub fn sever(&self) {
        self.lock().severed = true;
    }

    /// Requests received so far.
    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Trees currently connected across all sessions.
    pub fn open_trees(&self) -> usize {
        self.lock().open_trees
    }

    /// Highest number of simultaneously connected trees seen.
    pub fn max_open_trees(&self) -> usize {
        self.lock().max_open_trees
    }

    /// Contents of a file, if it exists.
    pub fn file(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        let idx = state.share_index(share).ok()?;
        state.shares[idx].files.get(&key(path)).cloned()
    }

    /// Whether a directory exists.
    pub fn has_directory(&self, share: &str, path: &str) -> bool {
        let state = self.lock();
        match state.share_index(share) {
            Ok(idx) => state.shares[idx].dirs.contains(&key(path)),
            Err(_) => false,
        }
    }
}

impl Connector for MemoryServer {
    fn connect(
        &self,
        _server_name: &str,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn ProtocolSession>> {
        let latency = {
            let mut state = self.lock();
            state.journal.push(Call::Connect {
                address: address.to_string(),
                port,
            });
            if let Some(reason) = &state.refuse_reason {
                return Err(ProtocolError::ConnectionFailed(reason.clone()));
            }
            state.connect_latency
        };

        if latency >= timeout {
            thread::sleep(timeout);
            return Err(ProtocolError::Timeout(format!(
                "no answer from {}:{} within {:?}",
                address, port, timeout
            )));
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        Ok(Box::new(MemorySession {
            server: self.clone(),
            authenticated: false,
            logged_off: false,
            trees: HashMap::new(),
            files: HashMap::new(),
            next_id: 0,
        }))
    }
}

#[derive(Debug, Clone)]
struct OpenEntry {
    tree: TreeId,
    share: String,
    path: String,
}

/// Session on a [`MemoryServer`].
pub struct MemorySession {
    server: MemoryServer,
    authenticated: bool,
    logged_off: bool,
    trees: HashMap<TreeId, String>,
    files: HashMap<FileId, OpenEntry>,
    next_id: u16,
}

impl MemorySession {
    fn allocate_id(&mut self) -> u16 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    /// Record the call and check the session is usable.
    fn begin(&self, call: Call) -> Result<MutexGuard<'_, State>> {
        let mut state = self.server.lock();
        state.journal.push(call);
        if state.severed {
            return Err(ProtocolError::ConnectionClosed(
                "connection reset by peer".to_string(),
            ));
        }
        if self.logged_off {
            return Err(ProtocolError::LoggedOff);
        }
        if !self.authenticated {
            return Err(ProtocolError::NotAuthenticated);
        }
        Ok(state)
    }

    fn call_latency(&self) {
        let latency = self.server.lock().call_latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }

    fn entry(&self, tree: TreeId, file: FileId) -> Result<OpenEntry> {
        match self.files.get(&file) {
            Some(entry) if entry.tree == tree => Ok(entry.clone()),
            _ => Err(ProtocolError::InvalidHandle(format!("{} on {}", file, tree))),
        }
    }

    fn tree_share(&self, tree: TreeId) -> Result<String> {
        self.trees
            .get(&tree)
            .cloned()
            .ok_or_else(|| ProtocolError::InvalidHandle(tree.to_string()))
    }
}

impl ProtocolSession for MemorySession {
    fn authenticate(&mut self, username: &str, password: &str, domain: &str) -> Result<()> {
        let state = {
            let mut state = self.server.lock();
            state.journal.push(Call::Authenticate {
                username: username.to_string(),
                domain: domain.to_string(),
            });
            state
        };
        if state.severed {
            return Err(ProtocolError::ConnectionClosed(
                "connection reset by peer".to_string(),
            ));
        }
        if let Some((user, pass)) = &state.account {
            if username != user || password != pass {
                return Err(ProtocolError::AuthenticationFailed(format!(
                    "logon failure for '{}'",
                    username
                )));
            }
        }
        drop(state);

        self.authenticated = true;
        Ok(())
    }

    fn list_shares(&mut self) -> Result<Vec<RawShareInfo>> {
        let state = self.begin(Call::ListShares)?;

        match state.enumeration {
            Enumeration::Denied => Err(ProtocolError::AccessDenied(
                "share enumeration is disabled".to_string(),
            )),
            Enumeration::Empty => Ok(Vec::new()),
            Enumeration::Allowed => {
                let mut shares: Vec<RawShareInfo> = state
                    .shares
                    .iter()
                    .map(|s| RawShareInfo {
                        name: format!("{}\0", s.name),
                        raw_flags: SHARE_TYPE_DISK,
                    })
                    .collect();
                shares.push(RawShareInfo {
                    name: "ADMIN$\0".to_string(),
                    raw_flags: SHARE_TYPE_DISK | SHARE_SPECIAL,
                });
                shares.push(RawShareInfo {
                    name: "IPC$\0".to_string(),
                    raw_flags: SHARE_TYPE_IPC | SHARE_SPECIAL,
                });
                Ok(shares)
            }
        }
    }

    fn connect_tree(&mut self, share: &str) -> Result<TreeId> {
        self.call_latency();
        let mut state = self.begin(Call::TreeConnect {
            share: share.to_string(),
        })?;

        if !share.eq_ignore_ascii_case("IPC$") {
            let idx = state.share_index(share)?;
            if state.shares[idx].locked {
                return Err(ProtocolError::AccessDenied(format!(
                    "tree connect to {} refused",
                    share
                )));
            }
        }

        state.open_trees += 1;
        state.max_open_trees = state.max_open_trees.max(state.open_trees);
        drop(state);

        let tree = TreeId(self.allocate_id());
        self.trees.insert(tree, share.to_string());
        Ok(tree)
    }

    fn disconnect_tree(&mut self, tree: TreeId) -> Result<()> {
        drop(self.begin(Call::TreeDisconnect { tree })?);

        if self.trees.remove(&tree).is_none() {
            return Err(ProtocolError::InvalidHandle(tree.to_string()));
        }
        self.files.retain(|_, entry| entry.tree != tree);

        let mut state = self.server.lock();
        state.open_trees = state.open_trees.saturating_sub(1);
        Ok(())
    }

    fn list_path(&mut self, share: &str, pattern: &str) -> Result<Vec<PathInfo>> {
        let state = self.begin(Call::ListPath {
            share: share.to_string(),
            pattern: pattern.to_string(),
        })?;

        let idx = state.share_index(share)?;
        let share = &state.shares[idx];
        if share.locked {
            return Err(ProtocolError::AccessDenied(share.name.clone()));
        }

        let (dir, mask) = split_pattern(pattern);
        let dir = key(dir);
        if !dir.is_empty() && !share.dirs.contains(&dir) {
            return Err(ProtocolError::NotFound(dir));
        }

        let mut results = Vec::new();
        for special in [".", ".."] {
            if wildcard_match(mask, special) {
                results.push(PathInfo::directory(special));
            }
        }

        // Children in key order, directories and files interleaved.
        let mut children: BTreeMap<&str, PathInfo> = BTreeMap::new();
        for d in share.dirs.iter().filter(|d| parent_key(d) == dir) {
            children.insert(d, PathInfo::directory(leaf_name(d)));
        }
        for (f, data) in share.files.iter().filter(|(f, _)| parent_key(f) == dir) {
            children.insert(f, PathInfo::file(leaf_name(f), data.len() as u64));
        }
        results.extend(
            children
                .into_values()
                .filter(|info| wildcard_match(mask, &info.long_name)),
        );

        Ok(results)
    }

    fn open_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        let share_name = self.tree_share(tree)?;
        let state = self.begin(Call::OpenFile {
            path: path.to_string(),
        })?;

        let idx = state.share_index(&share_name)?;
        let file_key = key(path);
        if !state.shares[idx].files.contains_key(&file_key) {
            return Err(ProtocolError::NotFound(path.to_string()));
        }
        drop(state);

        let id = FileId(self.allocate_id());
        self.files.insert(
            id,
            OpenEntry {
                tree,
                share: share_name,
                path: file_key,
            },
        );
        Ok(id)
    }

    fn file_size(&mut self, tree: TreeId, file: FileId) -> Result<u64> {
        let entry = self.entry(tree, file)?;
        let state = self.server.lock();
        if state.severed {
            return Err(ProtocolError::ConnectionClosed(
                "connection reset by peer".to_string(),
            ));
        }
        if state.sizes_hidden {
            return Err(ProtocolError::NotSupported(
                "file information query".to_string(),
            ));
        }
        let idx = state.share_index(&entry.share)?;
        state.shares[idx]
            .files
            .get(&entry.path)
            .map(|data| data.len() as u64)
            .ok_or(ProtocolError::NotFound(entry.path))
    }

    fn read_file(
        &mut self,
        tree: TreeId,
        file: FileId,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        let entry = self.entry(tree, file)?;
        self.call_latency();
        let state = self.begin(Call::ReadFile { offset, length })?;

        let lookup = (entry.share.to_lowercase(), entry.path.clone());
        if let Some(fail_at) = state.read_failures.get(&lookup) {
            if offset >= *fail_at {
                return Err(ProtocolError::Io(format!(
                    "read of {} failed at offset {}",
                    entry.path, offset
                )));
            }
        }

        let idx = state.share_index(&entry.share)?;
        let data = state.shares[idx]
            .files
            .get(&entry.path)
            .ok_or_else(|| ProtocolError::NotFound(entry.path.clone()))?;

        let mut end = data.len() as u64;
        if let Some(eof_at) = state.early_eof.get(&lookup) {
            end = end.min(*eof_at);
        }
        if offset >= end {
            return Ok(Vec::new());
        }
        let stop = end.min(offset + length as u64);
        Ok(data[offset as usize..stop as usize].to_vec())
    }

    fn close_file(&mut self, tree: TreeId, file: FileId) -> Result<()> {
        self.entry(tree, file)?;
        drop(self.begin(Call::CloseFile)?);
        self.files.remove(&file);
        Ok(())
    }

    fn create_file(&mut self, tree: TreeId, path: &str) -> Result<FileId> {
        let share_name = self.tree_share(tree)?;
        let mut state = self.begin(Call::CreateFile {
            path: path.to_string(),
        })?;

        let idx = state.share_index(&share_name)?;
        let share = &mut state.shares[idx];
        if share.read_only {
            return Err(ProtocolError::AccessDenied(format!(
                "share {} is read-only",
                share.name
            )));
        }

        let file_key = key(path);
        let parent = parent_key(&file_key);
        if !parent.is_empty() && !share.dirs.contains(parent) {
            return Err(ProtocolError::NotFound(parent.to_string()));
        }
        if file_key.is_empty() || share.dirs.contains(&file_key) {
            return Err(ProtocolError::AccessDenied(format!(
                "{} is a directory",
                path
            )));
        }
        share.files.insert(file_key.clone(), Vec::new());
        drop(state);

        let id = FileId(self.allocate_id());
        self.files.insert(
            id,
            OpenEntry {
                tree,
                share: share_name,
                path: file_key,
            },
        );
        Ok(id)
    }

    fn write_file(&mut self, tree: TreeId, file: FileId, data: &[u8]) -> Result<usize> {
        let entry = self.entry(tree, file)?;
        let mut state = self.begin(Call::WriteFile { bytes: data.len() })?;

        let idx = state.share_index(&entry.share)?;
        let contents = state.shares[idx]
            .files
            .get_mut(&entry.path)
            .ok_or_else(|| ProtocolError::NotFound(entry.path.clone()))?;
        contents.extend_from_slice(data);
        Ok(data.len())
    }

    fn create_directory(&mut self, share: &str, path: &str) -> Result<()> {
        let mut state = self.begin(Call::CreateDirectory {
            share: share.to_string(),
            path: path.to_string(),
        })?;

        let idx = state.share_index(share)?;
        let share = &mut state.shares[idx];
        if share.read_only || share.locked {
            return Err(ProtocolError::AccessDenied(format!(
                "share {} is read-only",
                share.name
            )));
        }

        let dir_key = key(path);
        if dir_key.is_empty() || share.dirs.contains(&dir_key) || share.files.contains_key(&dir_key)
        {
            return Err(ProtocolError::AlreadyExists(path.to_string()));
        }
        let parent = parent_key(&dir_key);
        if !parent.is_empty() && !share.dirs.contains(parent) {
            return Err(ProtocolError::NotFound(parent.to_string()));
        }
        share.dirs.insert(dir_key);
        Ok(())
    }

    fn logoff(&mut self) -> Result<()> {
        let mut state = self.begin(Call::Logoff)?;
        state.open_trees = state.open_trees.saturating_sub(self.trees.len());
        drop(state);

        self.trees.clear();
        self.files.clear();
        self.authenticated = false;
        self.logged_off = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn login(server: &MemoryServer) -> Box<dyn ProtocolSession> {
        let mut session = server.connect("SERVER", "10.0.0.5", 139, TIMEOUT).unwrap();
        session.authenticate("", "", "").unwrap();
        session
    }

    #[test]
    fn test_enumeration_lists_admin_shares_with_terminator() {
        let server = MemoryServer::new().with_share("Public");
        let mut session = login(&server);

        let names: Vec<String> = session
            .list_shares()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Public\0", "ADMIN$\0", "IPC$\0"]);
    }

    #[test]
    fn test_enumeration_denied() {
        let server = MemoryServer::new()
            .with_share("Public")
            .with_enumeration(Enumeration::Denied);
        let mut session = login(&server);

        assert!(matches!(
            session.list_shares(),
            Err(ProtocolError::AccessDenied(_))
        ));
        // The share is still connectable.
        let tree = session.connect_tree("Public").unwrap();
        session.disconnect_tree(tree).unwrap();
    }

    #[test]
    fn test_refused_connection() {
        let server = MemoryServer::new().refusing_connections("port closed");
        let result = server.connect("SERVER", "10.0.0.5", 139, TIMEOUT);
        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }

    #[test]
    fn test_connect_latency_over_timeout() {
        let server = MemoryServer::new().with_connect_latency(Duration::from_millis(200));
        let result = server.connect("SERVER", "10.0.0.5", 139, Duration::from_millis(20));
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
    }

    #[test]
    fn test_account_enforced() {
        let server = MemoryServer::new().with_account("bob", "pw");
        let mut session = server.connect("SERVER", "10.0.0.5", 139, TIMEOUT).unwrap();
        assert!(matches!(
            session.authenticate("", "", ""),
            Err(ProtocolError::AuthenticationFailed(_))
        ));
        session.authenticate("bob", "pw", "").unwrap();
    }

    #[test]
    fn test_list_path_interleaves_children() {
        let server = MemoryServer::new()
            .with_file("Public", "b.txt", b"12".to_vec())
            .with_directory("Public", "a_dir")
            .with_file("Public", "a_dir\\inner.txt", b"x".to_vec())
            .with_directory("Public", "C");
        let mut session = login(&server);

        let root: Vec<String> = session
            .list_path("Public", "*")
            .unwrap()
            .into_iter()
            .map(|i| i.long_name)
            .collect();
        assert_eq!(root, vec![".", "..", "C", "a_dir", "b.txt"]);

        let inner = session.list_path("Public", "\\a_dir\\*").unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[2], PathInfo::file("inner.txt", 1));
    }

    #[test]
    fn test_read_failure_injection() {
        let server = MemoryServer::new()
            .with_file("Public", "big.bin", vec![1u8; 100])
            .failing_reads_at("Public", "big.bin", 50);
        let mut session = login(&server);
        let tree = session.connect_tree("Public").unwrap();
        let file = session.open_file(tree, "\\big.bin").unwrap();

        assert_eq!(session.read_file(tree, file, 0, 50).unwrap().len(), 50);
        assert!(matches!(
            session.read_file(tree, file, 50, 50),
            Err(ProtocolError::Io(_))
        ));
    }

    #[test]
    fn test_early_eof_keeps_reported_size() {
        let server = MemoryServer::new()
            .with_file("Public", "big.bin", vec![1u8; 100])
            .ending_reads_at("Public", "big.bin", 40);
        let mut session = login(&server);
        let tree = session.connect_tree("Public").unwrap();
        let file = session.open_file(tree, "big.bin").unwrap();

        assert_eq!(session.file_size(tree, file).unwrap(), 100);
        assert_eq!(session.read_file(tree, file, 0, 64).unwrap().len(), 40);
        assert!(session.read_file(tree, file, 40, 64).unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_back() {
        let server = MemoryServer::new().with_share("Public");
        let mut session = login(&server);
        let tree = session.connect_tree("Public").unwrap();

        let file = session.create_file(tree, "\\up.txt").unwrap();
        session.write_file(tree, file, b"payload").unwrap();
        session.close_file(tree, file).unwrap();
        session.disconnect_tree(tree).unwrap();

        assert_eq!(server.file("public", "up.txt").unwrap(), b"payload");
    }

    #[test]
    fn test_read_only_share() {
        let server = MemoryServer::new().with_read_only_share("Docs");
        let mut session = login(&server);
        let tree = session.connect_tree("Docs").unwrap();

        assert!(matches!(
            session.create_file(tree, "x"),
            Err(ProtocolError::AccessDenied(_))
        ));
        assert!(matches!(
            session.create_directory("Docs", "\\NewFolder"),
            Err(ProtocolError::AccessDenied(_))
        ));
        assert!(!server.has_directory("Docs", "NewFolder"));
    }

    #[test]
    fn test_tree_bookkeeping() {
        let server = MemoryServer::new().with_share("A").with_share("B");
        let mut session = login(&server);

        let a = session.connect_tree("A").unwrap();
        let b = session.connect_tree("B").unwrap();
        assert_eq!(server.open_trees(), 2);
        session.disconnect_tree(a).unwrap();
        session.disconnect_tree(b).unwrap();
        assert_eq!(server.open_trees(), 0);
        assert_eq!(server.max_open_trees(), 2);
    }

    #[test]
    fn test_severed_connection() {
        let server = MemoryServer::new().with_share("Public");
        let mut session = login(&server);
        server.sever();

        let err = session.connect_tree("Public").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_journal_records_calls() {
        let server = MemoryServer::new().with_share("Public");
        let mut session = login(&server);
        server.clear_journal();

        let tree = session.connect_tree("Public").unwrap();
        session.disconnect_tree(tree).unwrap();
        session.logoff().unwrap();

        assert_eq!(
            server.journal(),
            vec![
                Call::TreeConnect {
                    share: "Public".to_string()
                },
                Call::TreeDisconnect { tree },
                Call::Logoff,
            ]
        );
    }
}
