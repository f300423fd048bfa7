//! File-backed reference console.
//!
//! Implements the subset of a game console the hotkey engine relies on:
//! `bind`, `unbind`, `alias`, `exec`, `writeconfig`, setting assignment,
//! alias invocation and notifiers. Commands are `;`-separated; double quotes
//! group a token and protect `;` inside it.
//!
//! `writeconfig` persists the bind table to `cfg/binds.cfg` and the settings
//! to `cfg/matchadminhotkeys.toml`; [`ConsoleHost::open`] loads both back.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Console, CvarStore, HostError};
use crate::bind::BINDS_FILE_NAME;
use crate::config::{write_atomic, Settings, SETTINGS_FILE_NAME};

/// Maximum alias/exec/notifier nesting before a command is rejected.
const MAX_DEPTH: usize = 16;

type Notifier = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ConsoleState {
    /// Key name -> bound command. Case-sensitive: `A` and `a` are different keys.
    binds: BTreeMap<String, String>,
    aliases: HashMap<String, String>,
    cvars: CvarStore,
    toasts: Vec<(String, String)>,
}

pub struct ConsoleHost {
    data_dir: PathBuf,
    state: Mutex<ConsoleState>,
    notifiers: Mutex<HashMap<String, Notifier>>,
    /// Notifiers currently running. Commands they execute start again at
    /// depth 0, so this is added to the nesting depth.
    notify_depth: AtomicUsize,
}

/// Holds one level of notifier nesting until dropped.
struct NotifyGuard<'a>(&'a AtomicUsize);

impl<'a> NotifyGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConsoleHost {
    /// Open the console over `data_dir`, creating `cfg/` when missing and
    /// loading persisted settings and binds.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, HostError> {
        let data_dir = data_dir.into();
        let cfg_dir = data_dir.join("cfg");
        std::fs::create_dir_all(&cfg_dir)?;

        let settings = Settings::load(&cfg_dir.join(SETTINGS_FILE_NAME))?;
        let host = Self {
            data_dir,
            state: Mutex::new(ConsoleState {
                cvars: CvarStore::from_settings(&settings),
                ..ConsoleState::default()
            }),
            notifiers: Mutex::new(HashMap::new()),
            notify_depth: AtomicUsize::new(0),
        };

        let binds_path = cfg_dir.join(BINDS_FILE_NAME);
        match std::fs::read_to_string(&binds_path) {
            Ok(content) => host.run_script(&content, 0)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %binds_path.display(), "No bind file yet");
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(data_dir = %host.data_dir.display(), binds = host.lock().binds.len(), "Console opened");
        Ok(host)
    }

    /// Register a named command that runs `handler` when executed.
    pub fn register_notifier<F>(&self, name: &str, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Simulate a key press: run whatever is bound to `key`.
    ///
    /// Returns `false` when nothing is bound.
    pub fn press(&self, key: &str) -> Result<bool, HostError> {
        let command = self.lock().binds.get(key).cloned();
        match command {
            Some(command) => {
                tracing::debug!(key = %key, command = %command, "Key press");
                self.run(&command, 0)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn binding(&self, key: &str) -> Option<String> {
        self.lock().binds.get(key).cloned()
    }

    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.lock().binds.clone()
    }

    /// Notifications raised so far, oldest first.
    pub fn toasts(&self) -> Vec<(String, String)> {
        self.lock().toasts.clone()
    }

    pub fn binds_path(&self) -> PathBuf {
        self.cfg_dir().join(BINDS_FILE_NAME)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.cfg_dir().join(SETTINGS_FILE_NAME)
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, command: &str, depth: usize) -> Result<(), HostError> {
        let nested = depth + self.notify_depth.load(Ordering::SeqCst);
        if nested > MAX_DEPTH {
            tracing::warn!(command = %command, depth = nested, "Command nesting too deep");
            return Err(HostError::RecursionLimit(MAX_DEPTH));
        }
        for statement in split_statements(command) {
            self.run_statement(statement, depth)?;
        }
        Ok(())
    }

    fn run_script(&self, text: &str, depth: usize) -> Result<(), HostError> {
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            self.run(line, depth)?;
        }
        Ok(())
    }

    fn run_statement(&self, statement: &str, depth: usize) -> Result<(), HostError> {
        let tokens = tokenize(statement);
        let Some((head, args)) = tokens.split_first() else {
            return Ok(());
        };

        match head.to_ascii_lowercase().as_str() {
            "bind" => match args {
                [key, command @ ..] if !command.is_empty() => {
                    self.lock()
                        .binds
                        .insert(key.clone(), command.join(" "));
                }
                _ => tracing::warn!(statement = %statement, "bind: expected a key and a command"),
            },
            "unbind" => match args.first() {
                Some(key) => {
                    self.lock().binds.remove(key);
                }
                None => tracing::warn!("unbind: expected a key"),
            },
            "alias" => match args {
                [name, body @ ..] => {
                    self.lock().aliases.insert(name.clone(), body.join(" "));
                }
                [] => tracing::warn!("alias: expected a name"),
            },
            "exec" => match args.first() {
                Some(name) => {
                    let path = self.script_path(name);
                    let text = std::fs::read_to_string(&path).map_err(|e| {
                        if e.kind() == std::io::ErrorKind::NotFound {
                            HostError::ScriptNotFound(path.display().to_string())
                        } else {
                            HostError::Io(e)
                        }
                    })?;
                    self.run_script(&text, depth + 1)?;
                    tracing::debug!(path = %path.display(), "Executed script");
                }
                None => tracing::warn!("exec: expected a file name"),
            },
            "writeconfig" => self.write_config()?,
            _ => self.run_named(head, args, depth)?,
        }
        Ok(())
    }

    /// Alias, setting or notifier, in that order.
    fn run_named(&self, name: &str, args: &[String], depth: usize) -> Result<(), HostError> {
        let alias = self.lock().aliases.get(name).cloned();
        if let Some(body) = alias {
            return self.run(&body, depth + 1);
        }

        {
            let mut state = self.lock();
            if state.cvars.is_registered(name) {
                if args.is_empty() {
                    tracing::info!(cvar = %name, value = ?state.cvars.get(name), "Setting value");
                } else {
                    state.cvars.set(name, &args.join(" "))?;
                }
                return Ok(());
            }
        }

        let notifier = self
            .notifiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match notifier {
            Some(handler) => {
                let _guard = NotifyGuard::enter(&self.notify_depth);
                handler();
            }
            None => tracing::warn!(command = %name, "Unknown command, ignoring"),
        }
        Ok(())
    }

    fn script_path(&self, name: &str) -> PathBuf {
        let file = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}.cfg", name)
        };
        self.cfg_dir().join(file)
    }

    fn write_config(&self) -> Result<(), HostError> {
        let (binds, settings) = {
            let state = self.lock();
            let binds: String = state
                .binds
                .iter()
                .map(|(key, command)| format!("bind {} \"{}\"\n", key, command.replace('"', "'")))
                .collect();
            (binds, state.cvars.to_settings())
        };

        let binds_path = self.binds_path();
        write_atomic(&binds_path, binds.as_bytes())?;
        settings.save(&self.settings_path())?;
        tracing::debug!(path = %binds_path.display(), "Persisted binds and settings");
        Ok(())
    }
}

impl Console for ConsoleHost {
    fn execute(&self, command: &str) -> Result<(), HostError> {
        self.run(command, 0)
    }

    fn cvar(&self, name: &str) -> Option<String> {
        self.lock().cvars.get(name).map(str::to_string)
    }

    fn set_cvar(&self, name: &str, value: &str) -> Result<(), HostError> {
        self.lock().cvars.set(name, value)
    }

    fn toast(&self, title: &str, message: &str) {
        tracing::info!(title = %title, message = %message, "Toast");
        self.lock()
            .toasts
            .push((title.to_string(), message.to_string()));
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }
}

/// Split on `;` outside double quotes. Quotes are kept for [`tokenize`].
fn split_statements(command: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in command.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                statements.push(&command[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    statements.push(&command[start..]);
    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whitespace-separated tokens; a double-quoted run is one token (possibly empty).
fn tokenize(statement: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in statement.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ConsoleHost) {
        let dir = tempfile::tempdir().unwrap();
        let host = ConsoleHost::open(dir.path()).unwrap();
        (dir, host)
    }

    #[test]
    fn test_tokenize_quotes_and_empty_values() {
        assert_eq!(
            tokenize(r#"bind Z "say hi; there""#),
            vec!["bind", "Z", "say hi; there"]
        );
        assert_eq!(tokenize(r#"mah_pause_cmd """#), vec!["mah_pause_cmd", ""]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_split_statements_respects_quotes() {
        assert_eq!(
            split_statements(r#"unbind A; alias x "a;b" ;;writeconfig"#),
            vec!["unbind A", r#"alias x "a;b""#, "writeconfig"]
        );
    }

    #[test]
    fn test_bind_and_unbind_are_case_sensitive() {
        let (_dir, host) = open_temp();
        host.execute("bind A mah_blue_plus;bind a mah_blue_minus").unwrap();
        assert_eq!(host.binding("A").as_deref(), Some("mah_blue_plus"));
        assert_eq!(host.binding("a").as_deref(), Some("mah_blue_minus"));

        host.execute("unbind A").unwrap();
        assert_eq!(host.binding("A"), None);
        assert!(host.binding("a").is_some());
    }

    #[test]
    fn test_alias_invocation_runs_body() {
        let (_dir, host) = open_temp();
        host.execute(r#"alias rebind "unbind Q;bind W mah_pause_toggle""#)
            .unwrap();
        host.execute("bind Q mah_pause_toggle;rebind").unwrap();
        assert_eq!(host.binding("Q"), None);
        assert_eq!(host.binding("W").as_deref(), Some("mah_pause_toggle"));
    }

    #[test]
    fn test_alias_loop_hits_recursion_limit() {
        let (_dir, host) = open_temp();
        host.execute(r#"alias spin "spin""#).unwrap();
        let err = host.execute("spin").unwrap_err();
        assert!(matches!(err, HostError::RecursionLimit(_)));
    }

    #[test]
    fn test_setting_assignment() {
        let (_dir, host) = open_temp();
        host.execute(r#"mah_pause_cmd "pause_server now""#).unwrap();
        assert_eq!(host.cvar("mah_pause_cmd").as_deref(), Some("pause_server now"));
        host.execute(r#"mah_pause_cmd """#).unwrap();
        assert_eq!(host.cvar("mah_pause_cmd").as_deref(), Some(""));
    }

    #[test]
    fn test_exec_missing_script() {
        let (_dir, host) = open_temp();
        let err = host.execute("exec nothing_here").unwrap_err();
        assert!(matches!(err, HostError::ScriptNotFound(_)));
    }

    #[test]
    fn test_exec_appends_cfg_extension() {
        let (dir, host) = open_temp();
        std::fs::write(
            dir.path().join("cfg").join("extra.cfg"),
            "// comment\nbind K mah_orange_minus\n",
        )
        .unwrap();
        host.execute("exec extra").unwrap();
        assert_eq!(host.binding("K").as_deref(), Some("mah_orange_minus"));
    }

    #[test]
    fn test_press_runs_notifier() {
        let (_dir, host) = open_temp();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        host.register_notifier("mah_blue_plus", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        host.execute("bind U mah_blue_plus").unwrap();

        assert!(host.press("U").unwrap());
        assert!(!host.press("X").unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notifier_reentry_hits_recursion_limit() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(ConsoleHost::open(dir.path()).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let limits = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&host);
        let (counter, limit_counter) = (Arc::clone(&hits), Arc::clone(&limits));
        host.register_notifier("echo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(host) = weak.upgrade() {
                if let Err(HostError::RecursionLimit(_)) = host.execute("echo") {
                    limit_counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        host.execute("echo").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), MAX_DEPTH + 1);
        assert_eq!(limits.load(Ordering::SeqCst), 1);

        // The nesting count unwinds, so a second run stops at the same place.
        host.execute("echo").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2 * (MAX_DEPTH + 1));
        assert_eq!(limits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builtin_commands_ignore_case() {
        let (_dir, host) = open_temp();
        host.execute("BIND Slash mah_pause_toggle").unwrap();
        assert_eq!(host.binding("Slash").as_deref(), Some("mah_pause_toggle"));
        host.execute("Unbind Slash").unwrap();
        assert_eq!(host.binding("Slash"), None);
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let (_dir, host) = open_temp();
        host.execute("definitely_not_a_command 1 2 3").unwrap();
    }

    #[test]
    fn test_writeconfig_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let host = ConsoleHost::open(dir.path()).unwrap();
            host.execute("bind Z \"mah_reset_kickoff\";mah_key_reset_kickoff Z;writeconfig")
                .unwrap();
        }
        let binds = std::fs::read_to_string(dir.path().join("cfg").join("binds.cfg")).unwrap();
        assert_eq!(binds, "bind Z \"mah_reset_kickoff\"\n");

        let host = ConsoleHost::open(dir.path()).unwrap();
        assert_eq!(host.binding("Z").as_deref(), Some("mah_reset_kickoff"));
        assert_eq!(host.cvar("mah_key_reset_kickoff").as_deref(), Some("Z"));
    }

    #[test]
    fn test_toasts_are_recorded() {
        let (_dir, host) = open_temp();
        host.toast("MatchAdminHotkeys", "Keybinds saved");
        assert_eq!(
            host.toasts(),
            vec![("MatchAdminHotkeys".to_string(), "Keybinds saved".to_string())]
        );
    }
}
