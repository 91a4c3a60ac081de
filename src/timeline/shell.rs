//! The track shell: the label column to the left of the timeline listing
//! every track, with collapse toggles for the ones that support it.

use iced::mouse;
use iced::widget::canvas::{self, Action, Geometry, Program};
use iced::{Color, Event, Point, Rectangle, Renderer, Size, Theme};

use crate::timeline::LANE_SPACING;
use crate::Message;

/// One row in the shell, mirroring one track in the timeline.
#[derive(Debug, Clone)]
pub(crate) struct ShellRow {
    pub title: String,
    pub height: f32,
    pub collapsible: bool,
    pub collapsed: bool,
}

pub(crate) struct ShellProgram {
    pub(crate) rows: Vec<ShellRow>,
}

#[derive(Default)]
pub(crate) struct ShellState {
    hovered_row: Option<usize>,
}

impl ShellProgram {
    fn row_at(&self, position: Point) -> Option<usize> {
        let mut y_offset = 0.0;
        for (index, row) in self.rows.iter().enumerate() {
            if position.y >= y_offset && position.y < y_offset + row.height {
                return Some(index);
            }
            y_offset += row.height + LANE_SPACING;
        }
        None
    }
}

impl Program<Message> for ShellProgram {
    type State = ShellState;

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
            Color::from_rgb(0.98, 0.98, 0.98),
        );

        let mut y_offset = 0.0;
        for (index, row) in self.rows.iter().enumerate() {
            let is_hovered = state.hovered_row == Some(index);
            if is_hovered {
                frame.fill_rectangle(
                    Point::new(0.0, y_offset),
                    Size::new(bounds.width, row.height),
                    Color::from_rgb(0.94, 0.94, 0.94),
                );
            }

            frame.stroke(
                &canvas::Path::line(
                    Point::new(0.0, y_offset),
                    Point::new(bounds.width, y_offset),
                ),
                canvas::Stroke::default()
                    .with_color(Color::from_rgb(0.9, 0.9, 0.9))
                    .with_width(1.0),
            );

            let mut text_x = 8.0;
            if row.collapsible {
                let icon = if row.collapsed { "\u{25b6}" } else { "\u{25bc}" };
                let icon_box = Rectangle {
                    x: 6.0,
                    y: y_offset + 3.0,
                    width: 14.0,
                    height: 14.0,
                };

                let icon_bg = if is_hovered {
                    Color::from_rgb(0.8, 0.86, 0.95)
                } else {
                    Color::from_rgb(0.92, 0.92, 0.92)
                };
                frame.fill_rectangle(icon_box.position(), icon_box.size(), icon_bg);
                frame.stroke(
                    &canvas::Path::rectangle(icon_box.position(), icon_box.size()),
                    canvas::Stroke::default()
                        .with_color(Color::from_rgba(0.0, 0.0, 0.0, 0.2))
                        .with_width(1.0),
                );
                frame.fill_text(canvas::Text {
                    content: icon.to_string(),
                    position: Point::new(icon_box.x + 3.0, icon_box.y + 1.0),
                    color: Color::from_rgb(0.2, 0.2, 0.2),
                    size: 10.0.into(),
                    ..Default::default()
                });
                text_x = 26.0;
            }

            frame.fill_text(canvas::Text {
                content: row.title.clone(),
                position: Point::new(text_x, y_offset + 5.0),
                color: if is_hovered {
                    Color::from_rgb(0.1, 0.2, 0.35)
                } else {
                    Color::from_rgb(0.2, 0.2, 0.2)
                },
                size: 12.0.into(),
                ..Default::default()
            });

            y_offset += row.height + LANE_SPACING;
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
        if let Event::Mouse(mouse::Event::CursorMoved { .. }) = event {
            let hovered = cursor
                .position_in(bounds)
                .and_then(|position| self.row_at(position));
            if hovered != state.hovered_row {
                state.hovered_row = hovered;
            }
        }

        if let Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) = event {
            if let Some(position) = cursor.position_in(bounds) {
                if let Some(index) = self.row_at(position) {
                    if self.rows[index].collapsible {
                        return Some(Action::publish(Message::ToggleTrackCollapse(index)));
                    }
                }
            }
        }

        None
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        _bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if state.hovered_row.is_some() {
            mouse::Interaction::Pointer
        } else {
            mouse::Interaction::default()
        }
    }
}
