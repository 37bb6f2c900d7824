use limebar::config::BarConfig;
use limebar::modules::{BatteryModule, ClockModule, Module};
use limebar::scheduler::Scheduler;
use tracing_subscriber::EnvFilter;

const COLOR_BG: &str = "#1A0B2E";
const COLOR_FG: &str = "#E0AAFF";

const FONT_TEXT: &str = "/usr/share/fonts/TTF/DejaVuSans.ttf:size=16";
const FONT_ICON: &str = "/usr/share/fonts/TTF/SymbolsNerdFont-Regular.ttf:size=16";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = BarConfig {
        name: "limebar".into(),
        background: Some(COLOR_BG.into()),
        foreground: Some(COLOR_FG.into()),
        topbar: true,
        fonts: vec![FONT_TEXT.into(), FONT_ICON.into()],
        ..Default::default()
    };

    let modules: Vec<Box<dyn Module>> =
        vec![Box::new(BatteryModule::new()), Box::new(ClockModule::new())];

    let mut scheduler = Scheduler::new(&config, modules)?;
    scheduler.initialize()?;
    scheduler.run()?;
    Ok(())
}
