use std::path::PathBuf;
use std::sync::Arc;

use iced::widget::canvas::Canvas;
use iced::widget::{button, column, container, pick_list, row, scrollable, text, Space};
use iced::{Alignment, Element, Length, Point, Task};
use iced_aw::{tab_bar, TabLabel};
use log::{error, warn};

mod cache;
mod config;
mod counter;
mod data;
mod engine;
mod fetcher;
mod file;
mod settings;
mod symbols;
mod time;
mod timeline;
mod track;
mod ui;

use crate::config::Config;
use crate::data::ProfileData;
use crate::engine::{InMemoryEngine, TraceEngine, TrackData, TrackQuery};
use crate::file::{FileLoadState, FileTab, FileView};
use crate::settings::SettingsPage;
use crate::time::{
    format_duration, humanise_duration, to_domain_time, TimeNs, TimeSpan, Timecode,
    TimestampFormat,
};
use crate::timeline::header::HeaderProgram;
use crate::timeline::mini_timeline::MiniTimelineProgram;
use crate::timeline::shell::{ShellProgram, ShellRow};
use crate::timeline::tracks::TracksProgram;
use crate::timeline::{
    TimeScale, HEADER_HEIGHT, LANE_SPACING, MINI_TIMELINE_HEIGHT, TRACK_SHELL_WIDTH,
};
use crate::track::TrackAction;

/// Narrowest window the view can zoom into.
const MIN_VISIBLE_NS: i64 = 1_000;
const OVERVIEW_BUCKETS: usize = 200;

pub fn main() -> iced::Result {
    env_logger::init();
    iced::application(Traceline::new, Traceline::update, Traceline::view)
        .title(Traceline::title)
        .run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewType {
    Stats,
    #[default]
    Timeline,
}

impl ViewType {
    const ALL: [ViewType; 2] = [ViewType::Stats, ViewType::Timeline];
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewType::Stats => write!(f, "Stats"),
            ViewType::Timeline => write!(f, "Timeline"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    TabSelected(usize),
    OpenFile,
    FileSelected(PathBuf),
    FileLoaded(u64, Result<Box<ProfileData>, String>),
    ViewChanged(ViewType),
    CloseTab(usize),
    OpenSettings,

    TracksResized { width: f32 },
    TrackMouseMoved { index: usize, position: Point },
    TrackMouseLeft,
    TrackClicked { index: usize, position: Point },
    TrackDoubleClicked { index: usize, position: Point },
    TimelineZoomed { delta: f32, x: f32, width: f32 },
    TimelinePanned { delta_x: f32, width: f32 },
    TimelineDragPanned { delta_x: f32, width: f32 },
    ToggleTrackCollapse(usize),
    OverviewJump { fraction: f64 },
    OverviewZoomTo { start_fraction: f64, end_fraction: f64 },

    TrackFetched {
        file_id: u64,
        track_index: usize,
        generation: u64,
        result: Result<TrackData, String>,
    },
    OverviewLoaded {
        file_id: u64,
        result: Result<TrackData, String>,
    },

    TimestampFormatPicked(TimestampFormat),
    CounterRoundingToggled,
    RegisterFileExtension,
    None,
}

struct Traceline {
    active_tab: usize,
    files: Vec<FileTab>,
    next_file_id: u64,
    show_settings: bool,
    settings: SettingsPage,
    config: Config,
}

impl Traceline {
    fn new() -> (Self, Task<Message>) {
        let config = config::load();
        let mut app = Traceline {
            active_tab: 0,
            files: Vec::new(),
            next_file_id: 0,
            show_settings: false,
            settings: SettingsPage::new(),
            config,
        };

        let mut initial_task = Task::none();
        if let Some(path_str) = std::env::args().nth(1) {
            let path = PathBuf::from(path_str);
            initial_task = app.open_path(path);
        }

        (app, initial_task)
    }

    fn title(&self) -> String {
        if self.show_settings {
            return "Traceline - Settings".to_string();
        }
        if let Some(file) = self.files.get(self.active_tab) {
            file.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Traceline".to_string())
        } else {
            "Traceline - trace viewer".to_string()
        }
    }

    fn open_path(&mut self, path: PathBuf) -> Task<Message> {
        let id = self.next_file_id;
        self.next_file_id += 1;
        self.files.push(FileTab {
            id,
            path: path.clone(),
            load_state: FileLoadState::Loading,
        });
        self.active_tab = self.files.len() - 1;
        self.show_settings = false;

        Task::perform(
            async move {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    data::load_profiling_data(&path)
                }))
                .unwrap_or_else(|payload| Err(data::format_panic_payload(payload)));
                (id, result)
            },
            |(id, result)| Message::FileLoaded(id, result.map(Box::new)),
        )
    }

    fn active_view_mut(&mut self) -> Option<&mut FileView> {
        self.files.get_mut(self.active_tab)?.view_mut()
    }

    /// Ask every track of the active file whether the current viewport
    /// needs new data, and spawn one engine task per answer.
    fn sync_tracks(&mut self) -> Task<Message> {
        let Some(file) = self.files.get_mut(self.active_tab) else {
            return Task::none();
        };
        let file_id = file.id;
        let Some(view) = file.view_mut() else {
            return Task::none();
        };

        let viewport = view.viewport();
        let engine = view.profile.engine.clone();
        let mut tasks = Vec::new();
        for (index, track) in view.tracks.iter_mut().enumerate() {
            if let Some(request) = track.on_update(&viewport) {
                let engine = engine.clone();
                tasks.push(Task::perform(
                    async move { engine.execute(request.query).map_err(|e| e.to_string()) },
                    move |result| Message::TrackFetched {
                        file_id,
                        track_index: index,
                        generation: request.generation,
                        result,
                    },
                ));
            }
        }
        Task::batch(tasks)
    }

    fn file_index(&self, file_id: u64) -> Option<usize> {
        self.files.iter().position(|file| file.id == file_id)
    }

    fn set_visible(&mut self, span: TimeSpan) -> Task<Message> {
        if let Some(view) = self.active_view_mut() {
            view.visible = clamp_to_trace(span, view.profile.trace_span);
        }
        self.sync_tracks()
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TabSelected(index) => {
                self.active_tab = index;
                self.show_settings = false;
                return self.sync_tracks();
            }
            Message::OpenFile => {
                return Task::perform(
                    async {
                        rfd::AsyncFileDialog::new()
                            .add_filter("measureme profdata", &["mm_profdata"])
                            .pick_file()
                            .await
                    },
                    |file_handle| {
                        if let Some(handle) = file_handle {
                            Message::FileSelected(handle.path().to_path_buf())
                        } else {
                            Message::None
                        }
                    },
                );
            }
            Message::FileSelected(path) => {
                return self.open_path(path);
            }
            Message::FileLoaded(id, result) => {
                let Some(index) = self.file_index(id) else {
                    // The tab was closed while the trace was loading.
                    return Task::none();
                };
                match result {
                    Ok(profile) => {
                        let engine = profile.engine.clone();
                        let view =
                            FileView::new(*profile, &self.config.counter.to_overrides());
                        self.files[index].load_state =
                            FileLoadState::Ready(Box::new(view));

                        let mut tasks = vec![overview_task(id, engine)];
                        if index == self.active_tab {
                            tasks.push(self.sync_tracks());
                        }
                        return Task::batch(tasks);
                    }
                    Err(e) => {
                        error!("{e}");
                        self.files[index].load_state = FileLoadState::Error(e);
                    }
                }
            }
            Message::ViewChanged(view_type) => {
                if let Some(view) = self.active_view_mut() {
                    view.view_type = view_type;
                }
            }
            Message::CloseTab(index) => {
                if index < self.files.len() {
                    if let Some(view) = self.files[index].view_mut() {
                        view.destroy_tracks();
                    }
                    self.files.remove(index);
                    if self.active_tab >= self.files.len() && !self.files.is_empty() {
                        self.active_tab = self.files.len() - 1;
                    }
                }
            }
            Message::OpenSettings => {
                self.show_settings = true;
            }

            Message::TracksResized { width } => {
                if let Some(view) = self.active_view_mut() {
                    view.viewport_width = width;
                }
                return self.sync_tracks();
            }
            Message::TrackMouseMoved { index, position } => {
                if let Some(view) = self.active_view_mut() {
                    let scale = TimeScale::new(view.visible, view.viewport_width);
                    for (i, track) in view.tracks.iter_mut().enumerate() {
                        if i == index {
                            track.on_mouse_move(position, &scale);
                        } else {
                            track.on_mouse_out();
                        }
                    }
                }
            }
            Message::TrackMouseLeft => {
                if let Some(view) = self.active_view_mut() {
                    for track in &mut view.tracks {
                        track.on_mouse_out();
                    }
                }
            }
            Message::TrackClicked { index, position } => {
                let mut action = None;
                if let Some(view) = self.active_view_mut() {
                    let scale = TimeScale::new(view.visible, view.viewport_width);
                    if let Some(track) = view.tracks.get_mut(index) {
                        action = track.on_mouse_click(position, &scale);
                    }
                }
                return self.handle_track_action(action);
            }
            Message::TrackDoubleClicked { index, position } => {
                let mut action = None;
                if let Some(view) = self.active_view_mut() {
                    let scale = TimeScale::new(view.visible, view.viewport_width);
                    if let Some(track) = view.tracks.get_mut(index) {
                        action = track.on_double_click(position, &scale);
                    }
                }
                return self.handle_track_action(action);
            }
            Message::TimelineZoomed { delta, x, width } => {
                let Some(view) = self.active_view_mut() else {
                    return Task::none();
                };
                let old_duration = view.visible.duration();
                if old_duration <= 0 || width <= 0.0 {
                    return Task::none();
                }
                view.viewport_width = width;

                let zoom_factor = if delta > 0.0 { 0.9 } else { 1.1 };
                let trace = view.profile.trace_span;
                let new_duration = ((old_duration as f64 * zoom_factor) as i64)
                    .clamp(MIN_VISIBLE_NS, trace.duration().max(MIN_VISIBLE_NS));

                let fraction = (x / width) as f64;
                let time_at_x =
                    view.visible.start().raw() as f64 + fraction * old_duration as f64;
                let new_start = (time_at_x - fraction * new_duration as f64) as i64;
                let span = TimeSpan::new(
                    TimeNs::from_raw(new_start),
                    TimeNs::from_raw(new_start + new_duration),
                );
                return self.set_visible(span);
            }
            Message::TimelinePanned { delta_x, width }
            | Message::TimelineDragPanned { delta_x, width } => {
                let Some(view) = self.active_view_mut() else {
                    return Task::none();
                };
                if width <= 0.0 {
                    return Task::none();
                }
                view.viewport_width = width;
                let duration = view.visible.duration();
                let shift = -((delta_x as f64 / width as f64) * duration as f64) as i64;
                let span = view.visible.add(shift);
                return self.set_visible(span);
            }
            Message::ToggleTrackCollapse(index) => {
                if let Some(view) = self.active_view_mut() {
                    if let Some(track) = view.tracks.get_mut(index) {
                        if track.supports_collapse() {
                            track.toggle_collapsed();
                        }
                    }
                }
            }
            Message::OverviewJump { fraction } => {
                let Some(view) = self.active_view_mut() else {
                    return Task::none();
                };
                let trace = view.profile.trace_span;
                let duration = view.visible.duration();
                let center =
                    trace.start().raw() as f64 + fraction * trace.duration() as f64;
                let start = (center - duration as f64 / 2.0) as i64;
                let span = TimeSpan::new(
                    TimeNs::from_raw(start),
                    TimeNs::from_raw(start + duration),
                );
                return self.set_visible(span);
            }
            Message::OverviewZoomTo {
                start_fraction,
                end_fraction,
            } => {
                let Some(view) = self.active_view_mut() else {
                    return Task::none();
                };
                let trace = view.profile.trace_span;
                let start = trace.start().raw() as f64
                    + start_fraction * trace.duration() as f64;
                let end =
                    trace.start().raw() as f64 + end_fraction * trace.duration() as f64;
                let end = end.max(start + MIN_VISIBLE_NS as f64);
                let span =
                    TimeSpan::new(TimeNs::from_raw(start as i64), TimeNs::from_raw(end as i64));
                return self.set_visible(span);
            }

            Message::TrackFetched {
                file_id,
                track_index,
                generation,
                result,
            } => {
                let Some(index) = self.file_index(file_id) else {
                    return Task::none();
                };
                if let Some(view) = self.files[index].view_mut() {
                    match result {
                        Ok(payload) => {
                            view.error = None;
                            if let Some(track) = view.tracks.get_mut(track_index) {
                                track.on_data(generation, payload);
                            }
                        }
                        Err(e) => {
                            // Stale data keeps rendering; surface the error
                            // and let the next update retry.
                            warn!("fetch failed: {e}");
                            view.error = Some(e);
                            if let Some(track) = view.tracks.get_mut(track_index) {
                                track.on_fetch_error(generation);
                            }
                        }
                    }
                }
                if index == self.active_tab {
                    return self.sync_tracks();
                }
            }
            Message::OverviewLoaded { file_id, result } => {
                let Some(index) = self.file_index(file_id) else {
                    return Task::none();
                };
                if let Some(view) = self.files[index].view_mut() {
                    match result {
                        Ok(TrackData::Overview(overview)) => {
                            view.overview = Some(overview);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("overview query failed: {e}"),
                    }
                }
            }

            Message::TimestampFormatPicked(format) => {
                self.config.timestamp_format = format;
                config::save(&self.config);
            }
            Message::CounterRoundingToggled => {
                use crate::counter::YRounding;
                self.config.counter.y_rounding = match self.config.counter.y_rounding {
                    YRounding::HumanReadable => YRounding::Strict,
                    YRounding::Strict => YRounding::HumanReadable,
                };
                config::save(&self.config);

                let overrides = self.config.counter.to_overrides();
                for file in &mut self.files {
                    if let Some(view) = file.view_mut() {
                        for track in &mut view.tracks {
                            track.apply_counter_defaults(&overrides);
                        }
                    }
                }
                return self.sync_tracks();
            }
            Message::RegisterFileExtension => {
                let message = match settings::register_file_extension() {
                    Ok(message) => message,
                    Err(message) => message,
                };
                self.settings.set_last_action_message(Some(message));
            }
            Message::None => {}
        }
        Task::none()
    }

    fn handle_track_action(&mut self, action: Option<TrackAction>) -> Task<Message> {
        match action {
            Some(TrackAction::SelectSlice(details)) => {
                if let Some(view) = self.active_view_mut() {
                    view.selected_slice = Some(details);
                }
                Task::none()
            }
            Some(TrackAction::ZoomTo(span)) => self.set_visible(span),
            None => Task::none(),
        }
    }

    fn view(&self) -> Element<'_, Message> {
        let mut bar = tab_bar::TabBar::new(Message::TabSelected).on_close(Message::CloseTab);

        for (i, file) in self.files.iter().enumerate() {
            let label = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Unknown".to_string());
            bar = bar.push(i, TabLabel::Text(label));
        }

        if !self.files.is_empty() && !self.show_settings {
            bar = bar.set_active_tab(&self.active_tab);
        }

        let header = row![bar, Space::new().width(Length::Fill)];

        let header = if let (Some(file), false) =
            (self.files.get(self.active_tab), self.show_settings)
        {
            if let Some(view) = file.view() {
                header.push(pick_list(
                    &ViewType::ALL[..],
                    Some(view.view_type),
                    Message::ViewChanged,
                ))
            } else {
                header.push(Space::new().width(Length::Shrink))
            }
        } else {
            header.push(Space::new().width(Length::Shrink))
        };

        let header = header
            .push(
                button("Settings")
                    .style(ui::neutral_button_style)
                    .on_press(Message::OpenSettings),
            )
            .push(
                button("Open")
                    .style(ui::neutral_button_style)
                    .on_press(Message::OpenFile),
            )
            .spacing(10)
            .padding(5)
            .align_y(Alignment::Center);

        let content: Element<'_, Message> = if self.show_settings {
            self.settings.view(&self.config)
        } else if let Some(file) = self.files.get(self.active_tab) {
            match &file.load_state {
                FileLoadState::Loading => centered_text("Loading trace..."),
                FileLoadState::Error(e) => centered_text(&format!("Error: {e}")),
                FileLoadState::Ready(view) => match view.view_type {
                    ViewType::Stats => self.stats_view(file, view),
                    ViewType::Timeline => self.timeline_view(view),
                },
            }
        } else {
            centered_text("Open a file to start")
        };

        column![header, content].into()
    }

    fn stats_view<'a>(&self, file: &'a FileTab, view: &'a FileView) -> Element<'a, Message> {
        let profile = &view.profile;
        let content = column![
            text(format!("File: {}", file.path.display())).size(20),
            text(format!("Command: {}", profile.cmd)),
            text(format!("PID: {}", profile.pid)),
            text(format!("Event count: {}", profile.event_count)),
            text(format!("Tracks: {}", view.tracks.len())),
            text(format!(
                "Trace duration: {}",
                humanise_duration(profile.trace_span.duration())
            )),
            text(format!(
                "Loaded in: {}",
                humanise_duration(profile.load_duration_ns as i64)
            )),
            button("Open another file").on_press(Message::OpenFile),
        ]
        .spacing(10)
        .padding(20);

        scrollable(content).into()
    }

    fn timeline_view<'a>(&self, view: &'a FileView) -> Element<'a, Message> {
        let trace = view.profile.trace_span;
        if trace.duration() <= 0 {
            return centered_text("No events to display");
        }

        let viewport = view.viewport();
        let offset = self
            .config
            .timestamp_format
            .domain_offset(trace.start());

        let header_canvas = row![
            Space::new().width(Length::Fixed(TRACK_SHELL_WIDTH)),
            Canvas::new(HeaderProgram {
                viewport,
                offset,
                format: self.config.timestamp_format,
            })
            .width(Length::Fill)
            .height(Length::Fixed(HEADER_HEIGHT)),
        ];

        let total_height: f32 = view
            .tracks
            .iter()
            .map(|track| track.height() + LANE_SPACING)
            .sum::<f32>()
            .max(1.0);

        let rows: Vec<ShellRow> = view
            .tracks
            .iter()
            .map(|track| ShellRow {
                title: track.title().to_string(),
                height: track.height(),
                collapsible: track.supports_collapse(),
                collapsed: track.is_collapsed(),
            })
            .collect();

        let tracks_area = scrollable(row![
            Canvas::new(ShellProgram { rows })
                .width(Length::Fixed(TRACK_SHELL_WIDTH))
                .height(Length::Fixed(total_height)),
            Canvas::new(TracksProgram {
                tracks: &view.tracks[..],
                viewport,
                offset,
            })
            .width(Length::Fill)
            .height(Length::Fixed(total_height)),
        ])
        .height(Length::Fill);

        let mini = row![
            Space::new().width(Length::Fixed(TRACK_SHELL_WIDTH)),
            Canvas::new(MiniTimelineProgram {
                trace_span: trace,
                visible: view.visible,
                overview: view.overview.as_ref(),
                offset,
            })
            .width(Length::Fill)
            .height(Length::Fixed(MINI_TIMELINE_HEIGHT)),
        ];

        let details: Element<'_, Message> = if let Some(selected) = &view.selected_slice {
            let start = to_domain_time(selected.start, offset);
            container(
                column![
                    text(format!("Slice: {}", selected.label)).size(20),
                    text(format!("Track: {}", selected.track_title)),
                    text(format!("Start: {}", Timecode::new(start))),
                    text(format!("Duration: {}", format_duration(selected.dur))),
                ]
                .spacing(5)
                .padding(10),
            )
            .width(Length::Fill)
            .height(Length::Fixed(120.0))
            .into()
        } else {
            container(text("Select a slice to see details"))
                .width(Length::Fill)
                .height(Length::Fixed(120.0))
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into()
        };

        let mut content = column![header_canvas, tracks_area, mini];
        if let Some(e) = &view.error {
            content = content.push(
                text(format!("Query failed: {e}"))
                    .size(12)
                    .color(iced::Color::from_rgb(0.8, 0.1, 0.1)),
            );
        }
        content.push(details).into()
    }
}

fn centered_text(message: &str) -> Element<'static, Message> {
    container(text(message.to_string()).size(20))
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
}

fn overview_task(file_id: u64, engine: Arc<InMemoryEngine>) -> Task<Message> {
    Task::perform(
        async move {
            engine
                .execute(TrackQuery::Overview {
                    buckets: OVERVIEW_BUCKETS,
                })
                .map_err(|e| e.to_string())
        },
        move |result| Message::OverviewLoaded { file_id, result },
    )
}

/// Clamp a candidate visible span into the trace, preserving its duration
/// where possible.
fn clamp_to_trace(span: TimeSpan, trace: TimeSpan) -> TimeSpan {
    let trace_duration = trace.duration().max(MIN_VISIBLE_NS);
    let duration = span.duration().clamp(MIN_VISIBLE_NS, trace_duration);
    let max_start = trace.end().raw() - duration;
    let start = span
        .start()
        .raw()
        .clamp(trace.start().raw().min(max_start), max_start);
    TimeSpan::new(TimeNs::from_raw(start), TimeNs::from_raw(start + duration))
}
