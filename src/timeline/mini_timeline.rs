//! The overview strip: whole-trace context, a density silhouette and the
//! viewport indicator. Left click jumps, right drag selects a zoom range.

use iced::mouse;
use iced::widget::canvas::{self, Action, Geometry, Program};
use iced::{Color, Event, Point, Rectangle, Renderer, Size, Theme};

use crate::engine::OverviewData;
use crate::time::{TimeNs, TimeSpan, to_domain_time};
use crate::timeline::ticks::{format_time_label, TickGenerator, TickKind};
use crate::Message;

pub(crate) struct MiniTimelineProgram<'a> {
    pub(crate) trace_span: TimeSpan,
    pub(crate) visible: TimeSpan,
    pub(crate) overview: Option<&'a OverviewData>,
    pub(crate) offset: TimeNs,
}

#[derive(Default)]
pub(crate) struct MiniTimelineState {
    selection_start: Option<Point>,
    selection_end: Option<Point>,
    selecting: bool,
    dragging: bool,
}

impl MiniTimelineProgram<'_> {
    fn selection_bounds(&self, state: &MiniTimelineState, bounds: Rectangle) -> Option<Rectangle> {
        let (start, end) = match (state.selection_start, state.selection_end) {
            (Some(start), Some(end)) => (start, end),
            _ => return None,
        };

        if bounds.width <= 0.0 {
            return None;
        }

        let x_start = start.x.min(end.x).max(0.0).min(bounds.width);
        let x_end = start.x.max(end.x).max(0.0).min(bounds.width);

        Some(Rectangle {
            x: x_start,
            y: 0.0,
            width: (x_end - x_start).max(0.0),
            height: bounds.height,
        })
    }
}

impl Program<Message> for MiniTimelineProgram<'_> {
    type State = MiniTimelineState;

    fn draw(
        &self,
        state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        frame.fill_rectangle(
            Point::new(0.0, 0.0),
            Size::new(bounds.width, bounds.height),
            Color::from_rgb(0.97, 0.97, 0.97),
        );

        let total = self.trace_span.duration();
        if total <= 0 || bounds.width <= 0.0 {
            return vec![frame.into_geometry()];
        }

        let time_to_x = |t: TimeNs| -> f32 {
            (t.diff(self.trace_span.start()) as f64 / total as f64 * bounds.width as f64) as f32
        };

        // Density silhouette behind everything else.
        if let Some(overview) = self.overview {
            if overview.max_count > 0 {
                let bar_width = bounds.width / overview.counts.len() as f32;
                for (i, &count) in overview.counts.iter().enumerate() {
                    if count == 0 {
                        continue;
                    }
                    let fraction = count as f32 / overview.max_count as f32;
                    let bar_height = (bounds.height - 14.0) * fraction;
                    frame.fill_rectangle(
                        Point::new(i as f32 * bar_width, bounds.height - bar_height),
                        Size::new(bar_width.max(1.0), bar_height),
                        Color::from_rgba(0.3, 0.45, 0.65, 0.35),
                    );
                }
            }
        }

        let generator = TickGenerator::new(self.trace_span, 8, self.offset);
        let step = generator.step() as f64;
        for tick in &generator {
            if tick.kind != TickKind::Major {
                continue;
            }
            let x = time_to_x(tick.time);
            frame.stroke(
                &canvas::Path::line(Point::new(x, 0.0), Point::new(x, bounds.height)),
                canvas::Stroke::default()
                    .with_color(Color::from_rgba(0.5, 0.5, 0.5, 0.3))
                    .with_width(1.0),
            );

            let relative = to_domain_time(tick.time, self.offset).raw() as f64;
            frame.fill_text(canvas::Text {
                content: format_time_label(relative, step),
                position: Point::new(x + 2.0, 2.0),
                color: Color::from_rgb(0.4, 0.4, 0.4),
                size: 10.0.into(),
                ..Default::default()
            });
        }

        // The viewport indicator.
        let x = time_to_x(self.visible.start());
        let width = (time_to_x(self.visible.end()) - x).max(4.0);
        frame.fill_rectangle(
            Point::new(x, 1.0),
            Size::new(width, bounds.height - 2.0),
            Color::from_rgba(0.1, 0.3, 0.6, 0.15),
        );
        frame.stroke(
            &canvas::Path::rectangle(
                Point::new(x, 1.0),
                Size::new(width, bounds.height - 2.0),
            ),
            canvas::Stroke::default()
                .with_color(Color::from_rgba(0.1, 0.3, 0.6, 0.5))
                .with_width(1.0),
        );

        if let Some(selection) = self.selection_bounds(state, bounds) {
            frame.fill_rectangle(
                selection.position(),
                selection.size(),
                Color::from_rgba(0.2, 0.4, 0.6, 0.2),
            );
            frame.stroke(
                &canvas::Path::rectangle(selection.position(), selection.size()),
                canvas::Stroke::default()
                    .with_color(Color::from_rgba(0.2, 0.4, 0.6, 0.6))
                    .with_width(1.0),
            );
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Action<Message>> {
        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(position) = cursor.position_in(bounds) {
                    if bounds.width > 0.0 {
                        let fraction = (position.x / bounds.width).clamp(0.0, 1.0) as f64;
                        state.dragging = true;
                        state.selecting = false;
                        state.selection_start = None;
                        state.selection_end = None;
                        return Some(Action::publish(Message::OverviewJump { fraction }));
                    }
                }
            }
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Right)) => {
                if let Some(position) = cursor.position_in(bounds) {
                    state.selecting = true;
                    state.dragging = false;
                    state.selection_start = Some(position);
                    state.selection_end = Some(position);
                    return Some(Action::publish(Message::None));
                }
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if state.dragging {
                    if let Some(position) = cursor.position_in(bounds) {
                        if bounds.width > 0.0 {
                            let fraction = (position.x / bounds.width).clamp(0.0, 1.0) as f64;
                            return Some(Action::publish(Message::OverviewJump { fraction }));
                        }
                    }
                }
                if state.selecting {
                    if let Some(position) = cursor.position_in(bounds) {
                        state.selection_end = Some(position);
                        return Some(Action::publish(Message::None));
                    }
                }
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                state.dragging = false;
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Right)) => {
                if state.selecting {
                    state.selecting = false;
                    if let Some(selection) = self.selection_bounds(state, bounds) {
                        if selection.width >= 4.0 && bounds.width > 0.0 {
                            let start_fraction =
                                (selection.x / bounds.width).clamp(0.0, 1.0) as f64;
                            let end_fraction = ((selection.x + selection.width) / bounds.width)
                                .clamp(0.0, 1.0) as f64;
                            state.selection_start = None;
                            state.selection_end = None;
                            return Some(Action::publish(Message::OverviewZoomTo {
                                start_fraction,
                                end_fraction,
                            }));
                        }
                    }
                    state.selection_start = None;
                    state.selection_end = None;
                }
            }
            _ => {}
        }
        None
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if state.selecting || cursor.position_in(bounds).is_some() {
            mouse::Interaction::Pointer
        } else {
            mouse::Interaction::default()
        }
    }
}
