//! Outbound config catalog
//!
//! Groups are enumerated from the outbounds directory. Node metadata is read
//! lazily in fixed-size chunks, one batched command per chunk, and cached per
//! group. Latency results are cached per file name and drive sorting and
//! pruning.
//!
//! All mutable state sits behind one async lock that is never held across a
//! channel call.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use shared::{
    component_debug, component_info, component_warn, Component, ConfigGroup, ConfigInfo, GroupKind, LatencyResult,
    OperationResult, PruneReport, ServiceState, SharedError,
};
use tokio::sync::Mutex;

use crate::config::{ControllerConfig, ModulePaths};
use crate::core::parse::{parse_batched_info, parse_lines, FILE_MARKER};
use crate::core::shell::{quote_path, shell_quote};
use crate::core::write_base64_command;
use crate::error::{ControllerError, ControllerResult};
use crate::services::latency::ping_latency;
use crate::services::lifecycle::probe_engine_state;
use crate::services::subscription::list_subscriptions;
use crate::traits::{CommandChannel, CommandResult};

/// Sort value of nodes that were never measured, behind failed ones
pub const UNMEASURED_SORT_VALUE: u32 = 99_999;

/// Lines read from the head of each file when extracting metadata
const INFO_HEAD_LINES: usize = 30;

/// Cached metadata of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoSlot {
    /// A fetch covering this node is in flight
    Loading,
    Ready(ConfigInfo),
}

/// What a chunk request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLoad {
    /// Metadata of this many nodes was fetched
    Fetched(usize),
    /// Every node of the chunk was already cached
    Cached,
    /// Another caller is fetching the same chunk
    InFlight,
    /// The group has no such chunk
    OutOfRange,
}

#[derive(Debug, Default)]
struct CatalogState {
    groups: Vec<ConfigGroup>,
    /// Group directory name -> file name -> slot
    info: HashMap<String, HashMap<String, InfoSlot>>,
    /// (group directory name, chunk index)
    in_flight: HashSet<(String, usize)>,
    latency: HashMap<String, LatencyResult>,
}

pub struct ConfigCatalog {
    channel: Arc<dyn CommandChannel>,
    paths: ModulePaths,
    chunk_size: usize,
    ping_timeout: Duration,
    state: Mutex<CatalogState>,
}

impl ConfigCatalog {
    pub fn new(channel: Arc<dyn CommandChannel>, config: &ControllerConfig) -> Self {
        Self {
            channel,
            paths: config.paths(),
            chunk_size: config.chunk_size.max(1),
            ping_timeout: config.ping_timeout,
            state: Mutex::new(CatalogState::default()),
        }
    }

    // --- groups ---

    /// Re-enumerate the default group and every subscription group
    ///
    /// The default group is omitted when it has no members. Metadata cached
    /// for groups that disappeared is dropped.
    pub async fn refresh_groups(&self) -> ControllerResult<Vec<ConfigGroup>> {
        let outbounds = self.paths.outbounds_dir();
        let mut groups = Vec::new();

        let defaults = self
            .list_members(&format!(
                "find {} -maxdepth 1 -name '*.json' -exec basename {{}} \\;",
                quote_path(&outbounds)
            ))
            .await?;
        if !defaults.is_empty() {
            groups.push(ConfigGroup {
                kind: GroupKind::Default,
                name: ConfigGroup::DEFAULT_NAME.to_string(),
                dir_name: String::new(),
                configs: defaults,
                url: None,
                updated: None,
            });
        }

        for subscription in list_subscriptions(self.channel.as_ref(), &self.paths).await? {
            let dir = outbounds.join(&subscription.dir_name);
            let listing = format!(
                "find {} -name '*.json' ! -name '_meta.json' -exec basename {{}} \\;",
                quote_path(&dir)
            );
            let configs = match self.list_members(&listing).await {
                Ok(configs) => configs,
                Err(e) if e.is_channel_failure() => return Err(e),
                Err(e) => {
                    component_warn!(Component::Catalog, group = %subscription.dir_name, error = %e, "group listing failed");
                    continue;
                }
            };
            groups.push(ConfigGroup {
                kind: GroupKind::Subscription,
                name: subscription.name,
                dir_name: subscription.dir_name,
                configs,
                url: subscription.url,
                updated: subscription.updated,
            });
        }

        let mut state = self.state.lock().await;
        state
            .info
            .retain(|dir_name, _| groups.iter().any(|g| &g.dir_name == dir_name));
        state.groups = groups.clone();
        component_debug!(Component::Catalog, groups = groups.len(), "groups refreshed");
        Ok(groups)
    }

    /// Groups from the last refresh
    pub async fn groups(&self) -> Vec<ConfigGroup> {
        self.state.lock().await.groups.clone()
    }

    /// Look a group up by display name or directory name
    pub async fn find_group(&self, name: &str) -> Option<ConfigGroup> {
        self.state
            .lock()
            .await
            .groups
            .iter()
            .find(|g| g.name == name || (!g.dir_name.is_empty() && g.dir_name == name))
            .cloned()
    }

    async fn list_members(&self, command: &str) -> ControllerResult<Vec<String>> {
        let output = self.channel.run(command).await?.into_output()?;
        let mut members = parse_lines(&output);
        members.sort();
        Ok(members)
    }

    // --- metadata ---

    pub fn chunk_count(&self, group: &ConfigGroup) -> usize {
        group.configs.len().div_ceil(self.chunk_size)
    }

    /// Fetch metadata for one chunk of a group with a single batched command
    ///
    /// A chunk that is already being fetched is not requested again. On
    /// failure the `Loading` markers are withdrawn so a later call can retry.
    pub async fn load_chunk(&self, group: &ConfigGroup, chunk: usize) -> ControllerResult<ChunkLoad> {
        let Some(members) = group.configs.chunks(self.chunk_size).nth(chunk) else {
            return Ok(ChunkLoad::OutOfRange);
        };
        let key = (group.dir_name.clone(), chunk);

        {
            let mut state = self.state.lock().await;
            if state.in_flight.contains(&key) {
                return Ok(ChunkLoad::InFlight);
            }
            let slots = state.info.entry(group.dir_name.clone()).or_default();
            if members.iter().all(|m| matches!(slots.get(m), Some(InfoSlot::Ready(_)))) {
                return Ok(ChunkLoad::Cached);
            }
            for member in members {
                slots.entry(member.clone()).or_insert(InfoSlot::Loading);
            }
            state.in_flight.insert(key.clone());
        }

        let fetched = self.fetch_infos(group, members).await;

        let mut state = self.state.lock().await;
        state.in_flight.remove(&key);
        let slots = state.info.entry(group.dir_name.clone()).or_default();
        match fetched {
            Ok(mut infos) => {
                for member in members {
                    let info = infos.remove(member).unwrap_or_else(ConfigInfo::unknown);
                    slots.insert(member.clone(), InfoSlot::Ready(info));
                }
                component_debug!(Component::Catalog, group = %group.name, chunk, nodes = members.len(), "chunk loaded");
                Ok(ChunkLoad::Fetched(members.len()))
            }
            Err(e) => {
                for member in members {
                    if slots.get(member) == Some(&InfoSlot::Loading) {
                        slots.remove(member);
                    }
                }
                component_warn!(Component::Catalog, group = %group.name, chunk, error = %e, "chunk fetch failed");
                Err(e)
            }
        }
    }

    /// Load every chunk of a group concurrently; returns the number of nodes fetched
    pub async fn load_group(&self, group: &ConfigGroup) -> ControllerResult<usize> {
        let loads = join_all((0..self.chunk_count(group)).map(|chunk| self.load_chunk(group, chunk))).await;
        let mut fetched = 0;
        for load in loads {
            if let ChunkLoad::Fetched(n) = load? {
                fetched += n;
            }
        }
        Ok(fetched)
    }

    pub async fn info(&self, group: &ConfigGroup, filename: &str) -> Option<InfoSlot> {
        self.state
            .lock()
            .await
            .info
            .get(&group.dir_name)
            .and_then(|slots| slots.get(filename))
            .cloned()
    }

    async fn fetch_infos(&self, group: &ConfigGroup, members: &[String]) -> ControllerResult<HashMap<String, ConfigInfo>> {
        let outbounds = self.paths.outbounds_dir();
        let file_list = members
            .iter()
            .map(|m| outbounds.join(group.relative_path(m)).to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        let command = format!(
            "while IFS= read -r f; do\n\
             [ -z \"$f\" ] && continue\n\
             echo \"{FILE_MARKER}$(basename \"$f\")===\"\n\
             head -{INFO_HEAD_LINES} \"$f\" 2>/dev/null | grep -E '\"protocol\"|\"address\"|\"port\"' | head -5\n\
             done << 'EOF'\n\
             {file_list}\n\
             EOF\n"
        );

        // Partial output is still usable when the last file was unreadable
        let result = self.channel.run(&command).await?;
        let result = if result.stdout.trim().is_empty() {
            result.ensure_success()?
        } else {
            result
        };
        Ok(parse_batched_info(&result.stdout))
    }

    // --- latency ---

    pub async fn latency(&self, filename: &str) -> Option<LatencyResult> {
        self.state.lock().await.latency.get(filename).copied()
    }

    pub async fn record_latency(&self, filename: &str, result: LatencyResult) {
        self.state.lock().await.latency.insert(filename.to_string(), result);
    }

    /// Ping every node of the group whose address is known, all at once
    ///
    /// Nodes without loaded metadata or without an address are skipped.
    pub async fn test_group_latency(&self, group: &ConfigGroup) -> Vec<(String, LatencyResult)> {
        let targets: Vec<(String, String)> = {
            let state = self.state.lock().await;
            let slots = state.info.get(&group.dir_name);
            group
                .configs
                .iter()
                .filter_map(|file| match slots?.get(file)? {
                    InfoSlot::Ready(info) if !info.address.is_empty() => Some((file.clone(), info.address.clone())),
                    _ => None,
                })
                .collect()
        };

        let channel = self.channel.as_ref();
        let budget = self.ping_timeout;
        let results = join_all(targets.into_iter().map(|(file, host)| async move {
            let latency = ping_latency(channel, &host, budget).await;
            (file, latency)
        }))
        .await;

        let mut state = self.state.lock().await;
        for (file, latency) in &results {
            state.latency.insert(file.clone(), *latency);
        }
        component_info!(Component::Catalog, group = %group.name, probed = results.len(), "latency test finished");
        results
    }

    /// Member file names ordered by cached latency, ascending
    ///
    /// Measured nodes come first whatever their value; failed probes follow at
    /// [`LatencyResult::UNREACHABLE_MS`], unmeasured nodes after them. Equal
    /// keys keep their listing order.
    pub async fn sorted_by_latency(&self, group: &ConfigGroup) -> Vec<String> {
        let state = self.state.lock().await;
        let mut files = group.configs.clone();
        files.sort_by_key(|file| match state.latency.get(file) {
            Some(latency) => (latency.millis().is_none(), latency.sort_value()),
            None => (true, UNMEASURED_SORT_VALUE),
        });
        files
    }

    /// Delete every node of the group whose cached latency is a timeout or failure
    ///
    /// One removal command per candidate; a failed removal is logged and the
    /// rest continue.
    pub async fn prune_invalid(&self, group: &ConfigGroup) -> PruneReport {
        let candidates: Vec<String> = {
            let state = self.state.lock().await;
            group
                .configs
                .iter()
                .filter(|file| state.latency.get(*file).is_some_and(LatencyResult::is_invalid))
                .cloned()
                .collect()
        };

        let mut report = PruneReport {
            candidates: candidates.clone(),
            deleted: Vec::new(),
        };
        for file in candidates {
            match self.remove_file(&group.relative_path(&file)).await {
                Ok(result) if result.success() => report.deleted.push(file),
                Ok(result) => {
                    component_warn!(Component::Catalog, file = %file, stderr = %result.stderr.trim(), "node removal failed");
                }
                Err(e) => {
                    component_warn!(Component::Catalog, file = %file, error = %e, "node removal failed");
                }
            }
        }

        self.forget(&group.dir_name, &report.deleted).await;
        component_info!(
            Component::Catalog,
            group = %group.name,
            deleted = report.success_count(),
            candidates = report.candidates.len(),
            "invalid nodes pruned"
        );
        report
    }

    /// Drop deleted files from every cache and from the stored group
    async fn forget(&self, dir_name: &str, files: &[String]) {
        if files.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for file in files {
            state.latency.remove(file);
            if let Some(slots) = state.info.get_mut(dir_name) {
                slots.remove(file);
            }
        }
        if let Some(stored) = state.groups.iter_mut().find(|g| g.dir_name == dir_name) {
            stored.configs.retain(|c| !files.contains(c));
        }
    }

    // --- file operations ---

    pub async fn read_config(&self, relative: &str) -> ControllerResult<String> {
        let path = self.outbound_path(relative)?;
        let result = self.channel.run(&format!("cat {}", quote_path(&path))).await?;
        Ok(result.ensure_success()?.stdout)
    }

    /// Overwrite a config file with `content`
    pub async fn save_config(&self, relative: &str, content: &str) -> ControllerResult<()> {
        let path = self.outbound_path(relative)?;
        self.channel
            .run(&write_base64_command(content, &path))
            .await?
            .ensure_success()?;
        self.invalidate(relative).await;
        Ok(())
    }

    pub async fn delete_config(&self, relative: &str) -> ControllerResult<OperationResult> {
        let result = self.remove_file(relative).await?;
        if !result.success() {
            return Ok(OperationResult::failed(failure_message(&result, "delete failed")));
        }

        let (dir_name, file) = split_relative(relative);
        self.forget(dir_name, &[file.to_string()]).await;
        Ok(OperationResult::ok())
    }

    /// Make `relative` the active config
    ///
    /// A running engine is hot-switched by the module script. Otherwise only
    /// `CURRENT_CONFIG` in module.conf is rewritten.
    pub async fn switch_config(&self, relative: &str) -> ControllerResult<OperationResult> {
        let path = self.outbound_path(relative)?;
        let path_text = path.to_string_lossy().into_owned();
        if path_text.contains(['|', '&', '\\', '"']) {
            return Err(SharedError::invalid("config path", path_text).into());
        }

        let state = probe_engine_state(self.channel.as_ref(), &self.paths).await?;
        let result = if state == ServiceState::Running {
            let command = format!(
                "sh {} {}",
                quote_path(&self.paths.switch_config_script()),
                shell_quote(&path_text)
            );
            self.channel.run(&command).await?
        } else {
            let expression = format!("s|^CURRENT_CONFIG=.*|CURRENT_CONFIG=\"{path_text}\"|");
            let command = format!(
                "sed -i {} {}",
                shell_quote(&expression),
                quote_path(&self.paths.module_conf())
            );
            self.channel.run(&command).await?
        };

        if result.success() {
            component_info!(Component::Catalog, config = relative, hot = state.is_running(), "config switched");
            Ok(OperationResult::ok())
        } else {
            Ok(OperationResult::failed(failure_message(&result, "switch failed")))
        }
    }

    /// Convert a share link into a node file with the module's proxylink tool
    pub async fn import_node_link(&self, link: &str) -> ControllerResult<OperationResult> {
        let link = link.trim();
        if link.is_empty() {
            return Ok(OperationResult::failed("node link is empty"));
        }

        let tool = quote_path(&self.paths.proxylink_binary());
        let command = format!(
            "cd {} && chmod +x {tool} && {tool} -parse {} -insecure -format xray -auto",
            quote_path(&self.paths.outbounds_dir()),
            shell_quote(link)
        );
        let result = self.channel.run(&command).await?;
        if result.success() {
            Ok(OperationResult::ok_with_output(result.stdout.trim()))
        } else {
            Ok(OperationResult::failed(failure_message(&result, "import failed")))
        }
    }

    async fn remove_file(&self, relative: &str) -> ControllerResult<CommandResult> {
        let path = self.outbound_path(relative)?;
        self.channel.run(&format!("rm {}", quote_path(&path))).await
    }

    async fn invalidate(&self, relative: &str) {
        let (dir_name, file) = split_relative(relative);
        let mut state = self.state.lock().await;
        if let Some(slots) = state.info.get_mut(dir_name) {
            slots.remove(file);
        }
    }

    /// Absolute path of a file below the outbounds directory
    fn outbound_path(&self, relative: &str) -> ControllerResult<PathBuf> {
        let rejected = relative.is_empty()
            || relative.starts_with('/')
            || relative.contains('\n')
            || relative.split('/').any(|part| part == ".." || part.is_empty());
        if rejected {
            return Err(ControllerError::SharedError(SharedError::invalid("config path", relative)));
        }
        Ok(self.paths.outbounds_dir().join(relative))
    }
}

/// `sub_x/a.json` -> (`sub_x`, `a.json`); top-level files belong to the default group
fn split_relative(relative: &str) -> (&str, &str) {
    relative.rsplit_once('/').unwrap_or(("", relative))
}

fn failure_message(result: &CommandResult, fallback: &str) -> String {
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        format!("{fallback} (exit code {})", result.exit_code)
    } else {
        stderr.to_string()
    }
}
