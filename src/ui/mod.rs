use iced::{
    widget::{button, column, progress_bar, row, text, text_input, Space},
    Element, Length,
};

/// Main view state
pub struct PaneView {
    pub title: String,
    pub nav_input: String,
    pub downloads_root: String,
    pub status_message: String,
    pub is_downloading: bool,
    pub download_progress: f32,
    /// Panes fed by browser downloads get an import button
    pub accepts_browser_downloads: bool,
}

impl PaneView {
    pub fn new(title: &str, start_url: &str, downloads_root: String, accepts_browser_downloads: bool) -> Self {
        Self {
            title: title.to_string(),
            nav_input: start_url.to_string(),
            downloads_root,
            status_message: "Paste a download link from the portal".to_string(),
            is_downloading: false,
            download_progress: 0.0,
            accepts_browser_downloads,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PaneMessage {
    NavInputChanged(String),
    OpenPressed,
    CancelPressed,
    ChooseHomePressed,
    ImportPressed,
}

impl PaneView {
    pub fn update(&mut self, message: PaneMessage) {
        match message {
            PaneMessage::NavInputChanged(url) => {
                self.nav_input = url;
            }
            PaneMessage::OpenPressed
            | PaneMessage::CancelPressed
            | PaneMessage::ChooseHomePressed
            | PaneMessage::ImportPressed => {
                // Will be handled by the app
            }
        }
    }

    pub fn view(&self) -> Element<'_, PaneMessage> {
        // Download and folder selection are gated while busy; cancel only while busy.
        let (download, cancel, choose_home) = if self.is_downloading {
            (
                button("Download"),
                button("Cancel").on_press(PaneMessage::CancelPressed),
                button("Downloads folder..."),
            )
        } else {
            (
                button("Download").on_press(PaneMessage::OpenPressed),
                button("Cancel"),
                button("Downloads folder...").on_press(PaneMessage::ChooseHomePressed),
            )
        };

        let mut buttons = row![
            download.padding([10, 20]),
            cancel.padding([10, 20]),
            choose_home.padding([10, 20]),
        ]
        .spacing(10);
        if self.accepts_browser_downloads {
            buttons = buttons.push(
                button("Import tile...")
                    .on_press(PaneMessage::ImportPressed)
                    .padding([10, 20]),
            );
        }

        column![
            text(&self.title).size(32),
            text(format!("Saving to {}", self.downloads_root)).size(12),
            Space::new().height(Length::Fixed(20.0)),
            text("Link:").size(16),
            text_input("Paste a download link...", &self.nav_input)
                .on_input(PaneMessage::NavInputChanged)
                .on_submit(PaneMessage::OpenPressed)
                .padding(10),
            Space::new().height(Length::Fixed(10.0)),
            progress_bar(0.0..=1.0, self.download_progress),
            text(&self.status_message).size(14),
            Space::new().height(Length::Fixed(20.0)),
            buttons,
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}
