//! The driving loop: blocks on the X connection descriptor with a
//! wall-clock-aligned timeout, drains events, routes click dispatches to
//! their owning modules, runs due updates, and presents when anything
//! changed.

use std::os::unix::io::RawFd;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::bar::Bar;
use crate::config::BarConfig;
use crate::element::Dispatch;
use crate::error::Error;
use crate::modules::Module;

pub struct Scheduler {
    bar: Bar,
    modules: Vec<Box<dyn Module>>,
}

impl Scheduler {
    pub fn new(config: &BarConfig, modules: Vec<Box<dyn Module>>) -> Result<Self, Error> {
        let bar = Bar::open(config)?;
        Ok(Self { bar, modules })
    }

    /// Run every module's one-time setup. Elements get created here, so
    /// this must happen before the first present.
    pub fn initialize(&mut self) -> Result<(), Error> {
        let Self { bar, modules } = self;
        for module in modules.iter_mut() {
            module.initialize(bar.elements_mut())?;
            tracing::info!(module = module.name(), "module initialized");
        }
        Ok(())
    }

    /// Event loop; runs until the process exits.
    pub fn run(&mut self) -> Result<(), Error> {
        let fd = self.bar.connection_fd();

        self.update_due(true);
        self.bar.present()?;

        loop {
            wait_for_activity(fd);

            let dispatches = self.bar.poll_events()?;
            let mut render = self.route_dispatches(dispatches);
            render |= self.update_due(false);

            if render {
                self.bar.present()?;
            }
        }
    }

    fn route_dispatches(&mut self, dispatches: Vec<Dispatch>) -> bool {
        let Self { bar, modules } = self;
        let mut render = false;

        for dispatch in dispatches {
            let Some(module) = modules.iter_mut().find(|m| m.name() == dispatch.module) else {
                tracing::warn!(module = dispatch.module, "dispatch for unknown module");
                continue;
            };

            let response = module.handle_event(bar.elements_mut(), &dispatch);
            if response.update {
                module.update(bar.elements_mut());
                module.cadence_mut().mark_updated(Instant::now());
            }
            render |= response.render;
        }

        render
    }

    /// Update every module whose cadence says so; returns whether any
    /// content may have changed.
    fn update_due(&mut self, force: bool) -> bool {
        let Self { bar, modules } = self;
        let now = Instant::now();
        let mut any = false;

        for module in modules.iter_mut() {
            if force || module.cadence_mut().should_update(now) {
                module.update(bar.elements_mut());
                module.cadence_mut().mark_updated(now);
                any = true;
            }
        }

        any
    }
}

/// Block until the connection has data or the next wall-clock second
/// ticks over, so second-granularity modules repaint right after the
/// boundary.
fn wait_for_activity(fd: RawFd) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let timeout = (1000 - nanos as i32 / 1_000_000) + 10;

    let mut poll_fd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    unsafe {
        libc::poll(&mut poll_fd, 1, timeout);
    }
}
