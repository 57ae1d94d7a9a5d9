use iced::{
    widget::{button, column, progress_bar, row, scrollable, text, text_input, Column, Space},
    Element, Length,
};

use super::{MainView, RowStatus, Screen, UiMessage};
use crate::utils::format_duration;

impl MainView {
    pub fn view(&self) -> Element<'_, UiMessage> {
        let body = match self.screen {
            Screen::Search => self.search_screen(),
            Screen::Listing => self.listing_screen(),
            Screen::Downloading => self.progress_screen(),
            Screen::Summary => self.summary_screen(),
        };

        column![
            body,
            Space::new().height(Length::Fixed(10.0)),
            text(&self.status_message).size(14),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }

    fn search_screen(&self) -> Element<'_, UiMessage> {
        let users = self
            .users
            .iter()
            .enumerate()
            .fold(Column::new().spacing(4), |list, (index, user)| {
                list.push(
                    button(text(format!("{}  ({})", user.display_name, user.username)))
                        .on_press(UiMessage::UserChosen(index))
                        .width(Length::Fill),
                )
            });

        column![
            text("Mixcloud Bulk Downloader").size(32),
            Space::new().height(Length::Fixed(20.0)),
            row![
                text_input("Artist or user name...", &self.query)
                    .on_input(UiMessage::QueryChanged)
                    .on_submit(UiMessage::SearchPressed)
                    .padding(10),
                button("Search")
                    .on_press_maybe((!self.searching).then_some(UiMessage::SearchPressed))
                    .padding([10, 20]),
            ]
            .spacing(10),
            scrollable(users).height(Length::Fill),
        ]
        .spacing(10)
        .into()
    }

    fn listing_screen(&self) -> Element<'_, UiMessage> {
        let owner = self
            .chosen_user
            .as_ref()
            .map_or("", |user| user.display_name.as_str());

        let list = self
            .cloudcasts
            .iter()
            .enumerate()
            .fold(Column::new().spacing(4), |list, (index, record)| {
                let mark = if self.selection.contains(&record.key) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let length = record.duration.map(format_duration).unwrap_or_default();
                list.push(
                    button(text(format!("{} {}  {}", mark, record.title, length)))
                        .on_press(UiMessage::CloudcastToggled(index))
                        .width(Length::Fill),
                )
            });

        let destination = match &self.destination {
            Some(path) => path.display().to_string(),
            None => "No destination folder".to_string(),
        };
        let can_download =
            !self.selection.is_empty() && self.destination.is_some() && !self.downloading;

        column![
            text(format!("Cloudcasts of {}", owner)).size(24),
            row![
                button("Back").on_press(UiMessage::BackToSearch),
                button("Select all").on_press(UiMessage::SelectAll),
                button("Select none").on_press(UiMessage::SelectNone),
                text(format!("{} selected", self.selection.len())),
            ]
            .spacing(10),
            row![
                button("Choose folder...").on_press(UiMessage::PickDestination),
                text(destination),
            ]
            .spacing(10),
            scrollable(list).height(Length::Fill),
            button("Download selected")
                .on_press_maybe(can_download.then_some(UiMessage::DownloadPressed))
                .padding([10, 20]),
        ]
        .spacing(10)
        .into()
    }

    fn progress_screen(&self) -> Element<'_, UiMessage> {
        let rows = self.rows.iter().fold(Column::new().spacing(4), |list, item| {
            let status = match &item.status {
                RowStatus::Pending => "waiting".to_string(),
                RowStatus::InProgress(fraction) => format!("{:.0}%", fraction * 100.0),
                RowStatus::Done(_) => "done".to_string(),
                RowStatus::Failed(reason) => format!("failed: {}", reason),
            };
            list.push(row![text(&item.title).width(Length::Fill), text(status)].spacing(10))
        });

        let cancel_label = if self.cancel_requested {
            "Cancelling..."
        } else {
            "Cancel"
        };

        column![
            text("Downloading").size(24),
            progress_bar(0.0..=1.0, self.overall_progress()),
            scrollable(rows).height(Length::Fill),
            button(cancel_label)
                .on_press_maybe((!self.cancel_requested).then_some(UiMessage::CancelPressed))
                .padding([10, 20]),
        ]
        .spacing(10)
        .into()
    }

    fn summary_screen(&self) -> Element<'_, UiMessage> {
        let mut content = column![text("Download summary").size(24)].spacing(10);

        if let Some(report) = &self.report {
            content = content.push(text(format!(
                "{} downloaded, {} failed",
                report.succeeded(),
                report.failed()
            )));
            if report.cancelled {
                content = content.push(text(format!(
                    "Cancelled, {} not started",
                    report.not_started
                )));
            }

            let failures = report
                .failures()
                .fold(Column::new().spacing(4), |list, (entry, error)| {
                    list.push(text(format!("{}: {}", entry.title, error)))
                });
            content = content.push(scrollable(failures).height(Length::Fill));
        }

        content
            .push(button("Back to list").on_press(UiMessage::BackToListing))
            .into()
    }
}
