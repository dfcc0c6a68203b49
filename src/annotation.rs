//! Line annotations: an L-shaped callout drawn from a map anchor to a label.
//!
//! Drawing is a two-click interaction. The first click anchors the line, mouse
//! movement previews it, the second click fixes it and hands back a draft
//! marker for the client to name, describe and decorate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Error, types::model::route::AttachedPhoto};

/// [lon, lat]
pub type Position = [f64; 2];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineCoordinates {
    pub start: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<Position>,
    pub end: Position,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineMarker {
    pub id: String,
    pub coordinates: LineCoordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub icons: Vec<String>,
    #[serde(default)]
    pub photos: Vec<AttachedPhoto>,
}

impl LineMarker {
    pub fn polyline(&self) -> Vec<Position> {
        let c = &self.coordinates;
        std::iter::once(c.start)
            .chain(c.mid)
            .chain(std::iter::once(c.end))
            .collect()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.polyline().iter().flatten().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "Line {} has non-finite coordinates",
                self.id
            )))
        }
    }
}

/// Geometry of the line between anchor and cursor: up/down first, then across
pub fn line_coordinates(start: Position, cursor: Position) -> LineCoordinates {
    let mid = if start[1] == cursor[1] {
        None
    } else {
        Some([start[0], cursor[1]])
    };
    LineCoordinates {
        start,
        mid,
        end: cursor,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LineDrawing {
    #[default]
    Idle,
    Drawing {
        start: Position,
        cursor: Position,
    },
}

impl LineDrawing {
    /// Returns the finished draft on the second click
    pub fn click(&mut self, at: Position) -> Option<LineMarker> {
        match *self {
            LineDrawing::Idle => {
                *self = LineDrawing::Drawing {
                    start: at,
                    cursor: at,
                };
                None
            }
            LineDrawing::Drawing { start, .. } => {
                *self = LineDrawing::Idle;
                Some(LineMarker {
                    id: Uuid::new_v4().to_string(),
                    coordinates: line_coordinates(start, at),
                    name: None,
                    description: None,
                    icons: vec![],
                    photos: vec![],
                })
            }
        }
    }

    /// Moves the cursor and returns the preview, if drawing
    pub fn mouse_move(&mut self, to: Position) -> Option<LineCoordinates> {
        match self {
            LineDrawing::Idle => None,
            LineDrawing::Drawing { start, cursor } => {
                *cursor = to;
                Some(line_coordinates(*start, to))
            }
        }
    }

    pub fn preview(&self) -> Option<LineCoordinates> {
        match self {
            LineDrawing::Idle => None,
            LineDrawing::Drawing { start, cursor } => Some(line_coordinates(*start, *cursor)),
        }
    }

    pub fn cancel(&mut self) {
        *self = LineDrawing::Idle;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self, LineDrawing::Drawing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_click_anchors_without_finishing() {
        let mut drawing = LineDrawing::default();
        assert!(drawing.click([147.3, -42.9]).is_none());
        assert!(drawing.is_drawing());
        let preview = drawing.preview().unwrap();
        assert_eq!(preview.start, preview.end);
        assert_eq!(preview.mid, None);
    }

    #[test]
    fn mouse_move_builds_vertical_then_horizontal_legs() {
        let mut drawing = LineDrawing::default();
        drawing.click([147.0, -42.0]);
        let preview = drawing.mouse_move([147.5, -41.5]).unwrap();
        assert_eq!(preview.start, [147.0, -42.0]);
        assert_eq!(preview.mid, Some([147.0, -41.5]));
        assert_eq!(preview.end, [147.5, -41.5]);
    }

    #[test]
    fn mouse_move_while_idle_is_ignored() {
        let mut drawing = LineDrawing::Idle;
        assert!(drawing.mouse_move([1.0, 1.0]).is_none());
        assert_eq!(drawing, LineDrawing::Idle);
    }

    #[test]
    fn second_click_finishes_and_resets() {
        let mut drawing = LineDrawing::default();
        drawing.click([147.0, -42.0]);
        drawing.mouse_move([147.2, -42.2]);
        let line = drawing.click([147.4, -42.1]).unwrap();
        assert_eq!(drawing, LineDrawing::Idle);
        assert_eq!(
            line.polyline(),
            vec![[147.0, -42.0], [147.0, -42.1], [147.4, -42.1]]
        );
        assert!(line.validate().is_ok());
    }

    #[test]
    fn horizontal_line_has_no_mid_point() {
        let coords = line_coordinates([10.0, 5.0], [12.0, 5.0]);
        assert_eq!(coords.mid, None);
    }

    #[test]
    fn cancel_discards_draft() {
        let mut drawing = LineDrawing::default();
        drawing.click([0.0, 0.0]);
        drawing.cancel();
        assert!(!drawing.is_drawing());
        assert!(drawing.click([1.0, 1.0]).is_none());
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let line = LineMarker {
            id: "l1".into(),
            coordinates: LineCoordinates {
                start: [f64::NAN, 0.0],
                mid: None,
                end: [1.0, 1.0],
            },
            name: None,
            description: None,
            icons: vec![],
            photos: vec![],
        };
        assert!(line.validate().is_err());
    }
}
