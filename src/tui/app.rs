//! Application controller: owns the terminal, the event loop, and every
//! piece of mutable host state.
//!
//! Adapted from the reference dashboard's `run_event_loop`/
//! `process_events` shape (manual `try_recv` draining plus a tick
//! sleep, rather than a `select!` over many branches) to drive a
//! `ratatui::Terminal` against live SSH workers instead of a container
//! runtime.

use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;

use crate::cache::TimingCache;
use crate::config::AppConfig;
use crate::error::ForgeError;
use crate::host::{Host, HostId};
use crate::phase::BuildPhase;
use crate::ssh::events::WorkerEvent;
use crate::ssh::executor::ParallelExecutor;
use crate::ssh::worker::CancellationToken;
use crate::stats::RunStatistics;
use crate::text::resolve_color;
use crate::tui::autoexit::{AutoExitManager, AutoExitState};
use crate::tui::input::{Action, InputMessage, NavigationMode, dispatch, spawn_keyboard_worker};
use crate::tui::renderer::{FrameSnapshot, Renderer, Theme, project_hosts};

const TICK_RATE: Duration = Duration::from_millis(100);
const MAX_EVENTS_PER_TICK: usize = 256;
const TILE_LINE_BUDGET: usize = 40;

/// Messages the controller selects over each tick.
enum ControllerEvent {
    Worker(WorkerEvent),
    Input(InputMessage),
}

pub struct ApplicationController {
    config: AppConfig,
    hosts: Vec<Host>,
    cache: Option<TimingCache>,
    run_start: Instant,
    nav_mode: NavigationMode,
    focused_index: Option<usize>,
    show_help: bool,
    show_minimized: bool,
    auto_exit: AutoExitManager,
    interrupted: bool,
    degraded: bool,
}

impl ApplicationController {
    pub fn new(config: AppConfig) -> Result<Self, ForgeError> {
        let hosts = config.hosts.iter().cloned().map(Host::new).collect();
        let cache = if config.cache_enabled {
            Some(TimingCache::load(
                &config.cache_file,
                config.cache_retention_days,
                config.cache_keep_builds,
                config.demo_host_prefixes.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            auto_exit: AutoExitManager::new(config.auto_exit_delay, config.auto_exit_enabled),
            hosts,
            cache,
            run_start: Instant::now(),
            nav_mode: NavigationMode::HostNav,
            focused_index: None,
            show_help: false,
            show_minimized: false,
            interrupted: false,
            degraded: false,
            config,
        })
    }

    /// Runs the full lifecycle: start the executor, drive the dashboard
    /// until shutdown, tear down the terminal, print the summary.
    /// Returns the process exit code.
    pub async fn run(mut self) -> Result<i32, ForgeError> {
        let cancel = CancellationToken::new();
        let (event_tx, mut event_rx) = mpsc::channel::<WorkerEvent>(256);
        let executor = ParallelExecutor::start(
            self.config.hosts.clone(),
            self.config.tarball.clone(),
            self.config.max_concurrent,
            self.config.connect_timeout,
            self.config.install_prefix.clone(),
            Arc::new(event_tx),
            cancel.clone(),
        );

        let exit_code = if self.config.show_progress {
            self.run_dashboard(&mut event_rx, &cancel).await?
        } else {
            self.run_headless(&mut event_rx).await?
        };

        executor.cancel_all();
        let _outcomes = executor.wait().await;

        if let Some(cache) = self.cache.as_mut() {
            if let Err(err) = cache.save(&self.config.cache_file) {
                log::warn!("could not save timing cache: {err}");
            }
        }

        let stats = RunStatistics::derive(&self.hosts, self.run_start, Instant::now());
        println!("{}", crate::summary::render(&self.hosts, &stats));

        Ok(exit_code)
    }

    async fn run_headless(&mut self, event_rx: &mut mpsc::Receiver<WorkerEvent>) -> Result<i32, ForgeError> {
        while let Some(event) = event_rx.recv().await {
            self.apply_worker_event(event);
            if self.all_terminal() {
                break;
            }
        }
        Ok(crate::summary::exit_code(&RunStatistics::derive(&self.hosts, self.run_start, Instant::now()), false))
    }

    async fn run_dashboard(
        &mut self,
        event_rx: &mut mpsc::Receiver<WorkerEvent>,
        cancel: &CancellationToken,
    ) -> Result<i32, ForgeError> {
        let mut terminal = setup_terminal().map_err(|err| ForgeError::Render(err.to_string()))?;
        let (input_tx, mut input_rx) = mpsc::channel::<InputMessage>(64);
        let _keyboard_handle = spawn_keyboard_worker(input_tx);

        let mut tick = tokio::time::interval(TICK_RATE);
        let mut quit = false;

        loop {
            tick.tick().await;

            let mut drained = 0;
            while drained < MAX_EVENTS_PER_TICK {
                let event = tokio::select! {
                    biased;
                    worker = event_rx.recv() => worker.map(ControllerEvent::Worker),
                    input = input_rx.recv() => input.map(ControllerEvent::Input),
                    else => None,
                };
                let Some(event) = event else { break };
                drained += 1;
                match event {
                    ControllerEvent::Worker(event) => {
                        if self.degraded {
                            print_degraded_event(&event);
                        }
                        self.apply_worker_event(event);
                    }
                    ControllerEvent::Input(InputMessage::Key(key)) => {
                        let action = dispatch(key, self.nav_mode);
                        if matches!(action, Action::Quit) {
                            quit = true;
                        }
                        self.apply_action(action);
                    }
                    ControllerEvent::Input(InputMessage::Resize(_, _)) => {
                        let _ = terminal.clear();
                    }
                }
            }

            self.auto_exit.on_host_terminal(self.all_terminal());
            let expired = matches!(self.auto_exit.poll(Instant::now()), AutoExitState::Expired);

            if quit || expired {
                cancel.cancel();
                break;
            }

            if !self.degraded {
                if let Err(err) = self.draw(&mut terminal) {
                    log::warn!("render failed, falling back to plain-text mode: {err}");
                    self.degraded = true;
                    let _ = teardown_terminal(&mut terminal);
                    println!("redland-forge: terminal rendering failed ({err}), switching to plain-text output");
                }
            }

            if self.all_terminal() && !self.config.auto_exit_enabled {
                // Dashboard stays open until the user quits.
            }
        }

        if !self.degraded {
            teardown_terminal(&mut terminal).map_err(|err| ForgeError::Render(err.to_string()))?;
        }
        self.interrupted = quit && !self.all_terminal();
        Ok(crate::summary::exit_code(
            &RunStatistics::derive(&self.hosts, self.run_start, Instant::now()),
            self.interrupted,
        ))
    }

    fn draw(&self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), std::io::Error> {
        let now = Instant::now();
        let stats = RunStatistics::derive(&self.hosts, self.run_start, now);
        let views = project_hosts(&self.hosts, TILE_LINE_BUDGET, self.cache.as_ref(), now);
        let snapshot = FrameSnapshot {
            hosts: views,
            stats,
            auto_exit: self.auto_exit.poll(Instant::now()),
            nav_mode: self.nav_mode,
            focused_index: self.focused_index,
            show_help: self.show_help,
            theme: Theme { color_enabled: resolve_color(self.config.color) },
        };
        terminal.draw(|frame| Renderer::draw(frame, &snapshot))?;
        Ok(())
    }

    fn apply_worker_event(&mut self, event: WorkerEvent) {
        let now = Instant::now();
        let host_id = event.host().clone();
        let Some(host) = self.hosts.iter_mut().find(|h| h.id() == &host_id) else { return };

        match event {
            WorkerEvent::Connecting { .. } => {
                host.advance_phase(BuildPhase::Connecting, now);
            }
            WorkerEvent::Preparing { .. } => {
                host.advance_phase(BuildPhase::Preparing, now);
            }
            WorkerEvent::Line { line, .. } => {
                host.push_output(line, now);
            }
            WorkerEvent::PhaseChanged { phase, .. } => {
                host.advance_phase(phase, now);
            }
            WorkerEvent::Completed { .. } => {
                host.finish_success(now);
                self.record_timing(&host_id, true);
            }
            WorkerEvent::Failed { exit_code, message, .. } => {
                host.finish_failure(exit_code, Some(message), now);
                self.record_timing(&host_id, false);
            }
        }
    }

    fn record_timing(&mut self, host_id: &HostId, success: bool) {
        let Some(cache) = self.cache.as_mut() else { return };
        let Some(host) = self.hosts.iter().find(|h| h.id() == host_id) else { return };
        let Some(start) = host.build_start() else { return };
        let total = host.last_activity().unwrap_or(start).saturating_duration_since(start).as_secs_f64();
        let durations = host.phase_durations();
        cache.record(
            host_id.as_str(),
            durations.configure_secs,
            durations.make_secs,
            durations.check_secs,
            durations.install_secs,
            total,
            success,
        );
    }

    fn apply_action(&mut self, action: Action) {
        let visible_len = self.hosts.len();
        match action {
            Action::Quit | Action::None => {}
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::PrevVisibleHost | Action::PrevHost => self.move_focus(visible_len, -1),
            Action::NextVisibleHost | Action::NextHost => self.move_focus(visible_len, 1),
            Action::EnterFullScreen => {
                if self.focused_index.is_some() {
                    self.nav_mode = NavigationMode::FullScreen;
                }
            }
            Action::ExitFullScreen => self.nav_mode = NavigationMode::HostNav,
            Action::OpenMenu => self.nav_mode = NavigationMode::Menu,
            Action::CloseMenu => self.nav_mode = NavigationMode::HostNav,
            Action::LeaveLogScroll => self.nav_mode = NavigationMode::HostNav,
            Action::MenuPrevEntry => self.move_focus(visible_len, -1),
            Action::MenuNextEntry => self.move_focus(visible_len, 1),
            Action::MenuSelectEntry => self.nav_mode = NavigationMode::FullScreen,
            Action::MenuJumpToEntry(n) => {
                let index = (n as usize).saturating_sub(1);
                if index < visible_len {
                    self.focused_index = Some(index);
                    self.nav_mode = NavigationMode::FullScreen;
                }
            }
            Action::ToggleMinimizedBand => self.show_minimized = !self.show_minimized,
            Action::ScrollUp(n) | Action::ScrollDown(n) => self.scroll_focused(action, n),
            Action::ScrollTop | Action::ScrollBottom => self.scroll_focused(action, 0),
        }
    }

    fn move_focus(&mut self, len: usize, delta: i64) {
        if len == 0 {
            return;
        }
        let current = self.focused_index.unwrap_or(0) as i64;
        let next = (current + delta).rem_euclid(len as i64) as usize;
        self.focused_index = Some(next);
    }

    fn scroll_focused(&mut self, action: Action, amount: u16) {
        let Some(index) = self.focused_index else { return };
        let Some(host) = self.hosts.get_mut(index) else { return };
        let offset = host.scroll_offset();
        let new_offset = match action {
            Action::ScrollUp(_) => offset.saturating_sub(amount as usize),
            Action::ScrollDown(_) => offset.saturating_add(amount as usize),
            Action::ScrollTop => 0,
            Action::ScrollBottom => host.output().len(),
            _ => offset,
        };
        host.set_scroll_offset(new_offset);
    }

    fn all_terminal(&self) -> bool {
        !self.hosts.is_empty() && self.hosts.iter().all(Host::is_terminal)
    }
}

/// Minimal plain-text rendering used once the ratatui renderer has
/// failed: no colors, no diffing, one line per event.
fn print_degraded_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Connecting { host } => println!("{host}: connecting"),
        WorkerEvent::Preparing { host } => println!("{host}: preparing"),
        WorkerEvent::Line { host, line } => println!("{host}: {line}"),
        WorkerEvent::PhaseChanged { host, phase } => println!("{host}: phase -> {phase}"),
        WorkerEvent::Completed { host } => println!("{host}: completed"),
        WorkerEvent::Failed { host, kind, message, .. } => println!("{host}: failed ({kind}): {message}"),
    }
}

fn setup_terminal() -> std::io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> std::io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::ColorMode;

    fn test_config(hosts: Vec<&str>) -> AppConfig {
        AppConfig {
            tarball: PathBuf::from("t.tgz"),
            hosts: hosts.into_iter().map(|h| HostId::parse(h).unwrap()).collect(),
            max_concurrent: 1,
            auto_exit_delay: Duration::from_secs(1),
            auto_exit_enabled: false,
            cache_file: PathBuf::from("/nonexistent/cache.json"),
            cache_retention_days: 30,
            cache_keep_builds: 5,
            cache_enabled: false,
            show_progress: false,
            color: ColorMode::Never,
            debug: false,
            connect_timeout: Duration::from_secs(1),
            demo_host_prefixes: vec!["test-".to_string()],
            install_prefix: "/usr/local".to_string(),
        }
    }

    #[test]
    fn new_controller_creates_one_host_per_config_entry() {
        let controller = ApplicationController::new(test_config(vec!["u@a", "u@b"])).unwrap();
        assert_eq!(controller.hosts.len(), 2);
    }

    #[test]
    fn move_focus_wraps_around() {
        let mut controller = ApplicationController::new(test_config(vec!["u@a", "u@b"])).unwrap();
        controller.focused_index = Some(1);
        controller.move_focus(2, 1);
        assert_eq!(controller.focused_index, Some(0));
    }

    #[test]
    fn worker_event_updates_matching_host_only() {
        let mut controller = ApplicationController::new(test_config(vec!["u@a", "u@b"])).unwrap();
        let host_id = HostId::parse("u@a").unwrap();
        controller.apply_worker_event(WorkerEvent::Line { host: host_id.clone(), line: "hello".to_string() });
        assert_eq!(controller.hosts[0].output().len(), 1);
        assert_eq!(controller.hosts[1].output().len(), 0);
    }

    #[test]
    fn all_terminal_is_false_until_every_host_finishes() {
        let mut controller = ApplicationController::new(test_config(vec!["u@a", "u@b"])).unwrap();
        assert!(!controller.all_terminal());
        controller.hosts[0].finish_success(Instant::now());
        assert!(!controller.all_terminal());
        controller.hosts[1].finish_success(Instant::now());
        assert!(controller.all_terminal());
    }
}
