//! The time ruler above the tracks: three label layers and a tick lattice
//! shared with the gridlines drawn behind the tracks.

use iced::mouse;
use iced::widget::canvas::{self, Geometry, Program};
use iced::{Color, Point, Rectangle, Renderer, Size, Theme};

use crate::time::{Timecode, TimestampFormat, to_domain_time};
use crate::timeline::ticks::{TickGenerator, TickKind, DESIRED_PX_PER_STEP};
use crate::timeline::Viewport;
use crate::Message;

pub(crate) struct HeaderProgram {
    pub(crate) viewport: Viewport,
    pub(crate) offset: crate::time::TimeNs,
    pub(crate) format: TimestampFormat,
}

impl Program<Message> for HeaderProgram {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        frame.fill_rectangle(
            Point::new(0.0, 0.0),
            Size::new(bounds.width, bounds.height),
            Color::from_rgb(0.95, 0.95, 0.95),
        );

        let visible = self.viewport.visible;
        if visible.duration() <= 0 {
            return vec![frame.into_geometry()];
        }

        let scale = self.viewport.scale();
        let max_majors = (bounds.width / DESIRED_PX_PER_STEP).max(1.0) as usize;
        let generator = TickGenerator::new(visible, max_majors, self.offset);

        let layer_height = bounds.height / 3.0;

        for tick in &generator {
            let x = scale.time_to_px(tick.time);

            let (tick_color, tick_width, tick_top) = match tick.kind {
                TickKind::Major => (Color::from_rgb(0.18, 0.18, 0.18), 1.0, 0.0),
                TickKind::Medium => (
                    Color::from_rgb(0.36, 0.36, 0.36),
                    0.8,
                    bounds.height * 0.4,
                ),
                TickKind::Minor => (
                    Color::from_rgb(0.55, 0.55, 0.55),
                    0.5,
                    bounds.height * 0.7,
                ),
            };
            frame.stroke(
                &canvas::Path::line(Point::new(x, tick_top), Point::new(x, bounds.height)),
                canvas::Stroke::default()
                    .with_color(tick_color)
                    .with_width(tick_width),
            );

            if tick.kind != TickKind::Major {
                continue;
            }

            // Major ticks carry three label layers: the coarse timestamp,
            // then the millisecond and microsecond groups below it.
            let domain = to_domain_time(tick.time, self.offset);
            let timecode = Timecode::new(domain);

            let top_label = match self.format {
                TimestampFormat::Timecode => timecode.dhhmmss(),
                TimestampFormat::Seconds => format!("{:.3} s", domain.to_seconds()),
                TimestampFormat::Raw => format!("{} ns", domain.raw()),
            };
            frame.fill_text(canvas::Text {
                content: top_label,
                position: Point::new(x + 2.0, 2.0),
                color: Color::from_rgb(0.2, 0.2, 0.2),
                size: 11.0.into(),
                ..Default::default()
            });

            frame.fill_text(canvas::Text {
                content: format!("{} ms", timecode.millis),
                position: Point::new(x + 2.0, layer_height + 2.0),
                color: Color::from_rgb(0.3, 0.3, 0.3),
                size: 11.0.into(),
                ..Default::default()
            });

            frame.fill_text(canvas::Text {
                content: format!("{} \u{00b5}s", timecode.micros),
                position: Point::new(x + 2.0, layer_height * 2.0 + 2.0),
                color: Color::from_rgb(0.4, 0.4, 0.4),
                size: 11.0.into(),
                ..Default::default()
            });
        }

        // Separators between the label layers.
        for layer in [1.0, 2.0] {
            frame.stroke(
                &canvas::Path::line(
                    Point::new(0.0, layer_height * layer),
                    Point::new(bounds.width, layer_height * layer),
                ),
                canvas::Stroke::default()
                    .with_color(Color::from_rgb(0.85, 0.85, 0.85))
                    .with_width(0.5),
            );
        }

        vec![frame.into_geometry()]
    }
}
