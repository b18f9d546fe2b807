use iced::window;
use tracing_subscriber::EnvFilter;
use usgs_portal_panes::app;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    iced::application(app::PaneApp::default, app::update, app::view)
        .title(app::title)
        .window(window::Settings {
            size: iced::Size::new(560.0, 420.0),
            ..Default::default()
        })
        .run()
}
