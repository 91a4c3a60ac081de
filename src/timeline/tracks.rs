//! The tracks canvas: paints every track at its vertical offset, draws the
//! shared gridlines behind them and routes pointer interaction to the app.

use std::time::{Duration, Instant};

use iced::widget::canvas::{self, Action, Geometry, Program};
use iced::{keyboard, mouse, Color, Event, Point, Rectangle, Renderer, Theme, Vector};

use crate::time::TimeNs;
use crate::timeline::ticks::{TickGenerator, TickKind, DESIRED_PX_PER_STEP};
use crate::timeline::{TimeScale, Viewport, DRAG_THRESHOLD, LANE_SPACING};
use crate::track::Track;
use crate::Message;

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

pub(crate) struct TracksProgram<'a> {
    pub(crate) tracks: &'a [Box<dyn Track>],
    pub(crate) viewport: Viewport,
    pub(crate) offset: TimeNs,
}

#[derive(Default)]
pub(crate) struct TracksState {
    modifiers: keyboard::Modifiers,
    press_position: Option<Point>,
    pressed_track: Option<(usize, Point)>,
    dragging: bool,
    last_click: Option<(usize, Instant)>,
}

impl TracksProgram<'_> {
    /// The track under `position`, with the position rebased to the
    /// track's own origin.
    fn track_at(&self, position: Point) -> Option<(usize, Point)> {
        let mut y_offset = 0.0;
        for (index, track) in self.tracks.iter().enumerate() {
            let height = track.height();
            if position.y >= y_offset && position.y < y_offset + height {
                return Some((index, Point::new(position.x, position.y - y_offset)));
            }
            y_offset += height + LANE_SPACING;
        }
        None
    }

    fn scale(&self, bounds: Rectangle) -> TimeScale {
        TimeScale::new(self.viewport.visible, bounds.width)
    }
}

impl Program<Message> for TracksProgram<'_> {
    type State = TracksState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let scale = self.scale(bounds);

        // Vertical guides matching the header's tick lattice.
        if self.viewport.visible.duration() > 0 {
            let max_majors = (bounds.width / DESIRED_PX_PER_STEP).max(1.0) as usize;
            let generator = TickGenerator::new(self.viewport.visible, max_majors, self.offset);
            for tick in &generator {
                let alpha = match tick.kind {
                    TickKind::Major => 0.30,
                    TickKind::Medium => 0.15,
                    TickKind::Minor => continue,
                };
                let x = scale.time_to_px(tick.time);
                frame.stroke(
                    &canvas::Path::line(Point::new(x, 0.0), Point::new(x, bounds.height)),
                    canvas::Stroke::default()
                        .with_color(Color::from_rgba(0.5, 0.5, 0.5, alpha))
                        .with_width(1.0),
                );
            }
        }

        let mut y_offset = 0.0;
        for track in self.tracks {
            let height = track.height();

            frame.stroke(
                &canvas::Path::line(
                    Point::new(0.0, y_offset),
                    Point::new(bounds.width, y_offset),
                ),
                canvas::Stroke::default()
                    .with_color(Color::from_rgb(0.9, 0.9, 0.9))
                    .with_width(1.0),
            );

            frame.with_save(|frame| {
                frame.translate(Vector::new(0.0, y_offset));
                track.render(frame, &scale);
            });

            y_offset += height + LANE_SPACING;
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
            Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                state.modifiers = *modifiers;
            }
            Event::Window(_) => {
                // Keep the app's notion of the viewport width in sync so
                // fetch resolutions match what is actually rendered.
                if (bounds.width - self.viewport.width_px).abs() > 0.5 {
                    return Some(Action::publish(Message::TracksResized {
                        width: bounds.width,
                    }));
                }
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if (bounds.width - self.viewport.width_px).abs() > 0.5 {
                    return Some(Action::publish(Message::TracksResized {
                        width: bounds.width,
                    }));
                }

                if let (Some(press), Some(current)) = (state.press_position, cursor.position())
                {
                    let delta = current - press;
                    if !state.dragging && delta.x.hypot(delta.y) > DRAG_THRESHOLD {
                        state.dragging = true;
                    }
                    if state.dragging {
                        state.press_position = Some(current);
                        return Some(Action::publish(Message::TimelineDragPanned {
                            delta_x: delta.x,
                            width: bounds.width,
                        }));
                    }
                }

                match cursor.position_in(bounds).and_then(|p| self.track_at(p)) {
                    Some((index, local)) => {
                        return Some(Action::publish(Message::TrackMouseMoved {
                            index,
                            position: local,
                        }));
                    }
                    None => {
                        return Some(Action::publish(Message::TrackMouseLeft));
                    }
                }
            }
            Event::Mouse(mouse::Event::CursorLeft) => {
                return Some(Action::publish(Message::TrackMouseLeft));
            }
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(position) = cursor.position_in(bounds) {
                    state.press_position = cursor.position();
                    state.pressed_track = self.track_at(position);
                    state.dragging = false;
                }
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                let pressed = state.pressed_track.take();
                state.press_position = None;
                if state.dragging {
                    state.dragging = false;
                } else if let (Some((index, _)), Some(position)) =
                    (pressed, cursor.position_in(bounds))
                {
                    if let Some((release_index, local)) = self.track_at(position) {
                        if release_index == index {
                            let now = Instant::now();
                            let is_double = matches!(
                                state.last_click,
                                Some((last_index, at))
                                    if last_index == index
                                        && now.duration_since(at) <= DOUBLE_CLICK_WINDOW
                            );
                            if is_double {
                                state.last_click = None;
                                return Some(Action::publish(Message::TrackDoubleClicked {
                                    index,
                                    position: local,
                                }));
                            }
                            state.last_click = Some((index, now));
                            return Some(Action::publish(Message::TrackClicked {
                                index,
                                position: local,
                            }));
                        }
                    }
                }
            }
            Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if let Some(position) = cursor.position_in(bounds) {
                    let (mouse::ScrollDelta::Lines { x, y }
                    | mouse::ScrollDelta::Pixels { x, y }) = delta;

                    if state.modifiers.shift() {
                        if y.abs() > 0.0 {
                            return Some(
                                Action::publish(Message::TimelinePanned {
                                    delta_x: *y * 30.0,
                                    width: bounds.width,
                                })
                                .and_capture(),
                            );
                        }
                    } else if y.abs() > x.abs() {
                        return Some(
                            Action::publish(Message::TimelineZoomed {
                                delta: *y,
                                x: position.x,
                                width: bounds.width,
                            })
                            .and_capture(),
                        );
                    } else if x.abs() > 0.0 {
                        return Some(
                            Action::publish(Message::TimelinePanned {
                                delta_x: -*x * 30.0,
                                width: bounds.width,
                            })
                            .and_capture(),
                        );
                    }
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
        if state.dragging {
            mouse::Interaction::Grabbing
        } else if cursor.position_in(bounds).is_some() {
            mouse::Interaction::default()
        } else {
            mouse::Interaction::default()
        }
    }
}
