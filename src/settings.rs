//! The settings page: usage hints, display preferences and OS integration.

use iced::widget::{button, column, container, pick_list, row, text, Space};
use iced::{Alignment, Element, Length};

use crate::config::Config;
use crate::counter::YRounding;
use crate::time::TimestampFormat;
use crate::Message;

#[derive(Debug, Default)]
pub struct SettingsPage {
    last_action_message: Option<String>,
}

impl SettingsPage {
    pub fn new() -> Self {
        Self {
            last_action_message: None,
        }
    }

    pub fn set_last_action_message(&mut self, message: Option<String>) {
        self.last_action_message = message;
    }

    pub fn view(&self, config: &Config) -> Element<'_, Message> {
        let hint = |action: &str, effect: &str| {
            row![
                text(action.to_string()).width(Length::Fixed(220.0)).size(12),
                text(effect.to_string()).size(12)
            ]
        };

        let hints = column![
            text("Hints").size(16),
            hint("Left click:", "Select a slice and show its details"),
            hint("Double click:", "Zoom to the clicked slice (with padding)"),
            hint("Left click + drag:", "Pan the timeline"),
            hint("Mouse wheel:", "Zoom horizontally centered on the cursor"),
            hint("Shift + mouse wheel:", "Pan horizontally"),
            hint("Hover a counter:", "Show the nearest bucket's last/avg/count"),
            hint("Overview - left click:", "Jump the view to that position"),
            hint(
                "Overview - right click + drag:",
                "Select a range to zoom the view to"
            ),
            hint("Track label click:", "Collapse or expand that track"),
            hint(
                "Grey regions:",
                "Data for that range has not been fetched yet"
            ),
        ]
        .spacing(6)
        .padding(6);

        let rounding_label = match config.counter.y_rounding {
            YRounding::HumanReadable => "Counter axis rounding: human readable",
            YRounding::Strict => "Counter axis rounding: strict",
        };

        let preferences = column![
            text("Preferences").size(16),
            row![
                text("Timestamp format:").width(Length::Fixed(220.0)).size(12),
                pick_list(
                    &TimestampFormat::ALL[..],
                    Some(config.timestamp_format),
                    Message::TimestampFormatPicked,
                )
                .text_size(12)
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            button(text(rounding_label).size(12)).on_press(Message::CounterRoundingToggled),
        ]
        .spacing(8)
        .padding(6);

        let settings_col = column![
            text("Settings").size(20),
            preferences,
            row![
                button(text("Register .mm_profdata").size(12))
                    .on_press(Message::RegisterFileExtension),
                if let Some(msg) = &self.last_action_message {
                    Element::from(text(msg).size(12))
                } else {
                    Element::from(Space::new().width(Length::Fill))
                }
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            container(hints).padding(6).style(|_theme: &iced::Theme| {
                container::Style::default().background(iced::Color::from_rgb(0.99, 0.99, 0.99))
            }),
        ]
        .spacing(8)
        .padding(10);

        container(settings_col)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .style(|theme: &iced::Theme| {
                let palette = theme.extended_palette();
                container::Style::default()
                    .background(palette.background.base.color)
                    .border(iced::Border {
                        color: palette.background.strong.color,
                        width: 1.0,
                        ..Default::default()
                    })
            })
            .into()
    }
}

/// Associate `.mm_profdata` files with this executable in the Windows
/// registry.
#[cfg(windows)]
pub fn register_file_extension() -> Result<String, String> {
    use winreg::enums::HKEY_CURRENT_USER;
    use winreg::RegKey;

    let exe = std::env::current_exe().map_err(|e| format!("Could not locate executable: {e}"))?;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (ext_key, _) = hkcu
        .create_subkey("Software\\Classes\\.mm_profdata")
        .map_err(|e| format!("Could not create extension key: {e}"))?;
    ext_key
        .set_value("", &"traceline.profdata")
        .map_err(|e| format!("Could not set extension value: {e}"))?;

    let (command_key, _) = hkcu
        .create_subkey("Software\\Classes\\traceline.profdata\\shell\\open\\command")
        .map_err(|e| format!("Could not create command key: {e}"))?;
    command_key
        .set_value("", &format!("\"{}\" \"%1\"", exe.display()))
        .map_err(|e| format!("Could not set command value: {e}"))?;

    Ok("Registered .mm_profdata with this executable".to_string())
}

#[cfg(not(windows))]
pub fn register_file_extension() -> Result<String, String> {
    Err("File type registration is only supported on Windows".to_string())
}
