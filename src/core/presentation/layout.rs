use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

use crate::config::PresentationConfig;

/// A point or extent in renderer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

/// Window geometry supplied by the renderer each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub position: Vec2,
    pub size: Vec2,
}

impl Viewport {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self { position, size }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.size.x / 2.0, self.size.y / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Scroll offset and zoom level of one graph view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub scroll: Vec2,
    node_size: f32,
    node_min_size: f32,
    spacing_factor: f32,
    scroll_speed: f32,
    zoom_speed: f32,
}

impl ViewState {
    pub fn new(config: &PresentationConfig) -> Self {
        Self {
            scroll: Vec2::ZERO,
            node_size: config.node_min_size,
            node_min_size: config.node_min_size,
            spacing_factor: config.spacing_factor,
            scroll_speed: config.scroll_speed,
            zoom_speed: config.zoom_speed,
        }
    }

    /// Edge length of the square every node occupies.
    pub fn node_size(&self) -> f32 {
        self.node_size
    }

    /// Distance between neighbouring columns and rows.
    pub fn spacing(&self) -> f32 {
        self.node_size * self.spacing_factor
    }

    pub fn scroll_by(&mut self, direction: ScrollDirection) {
        match direction {
            ScrollDirection::Up => self.scroll.y -= self.scroll_speed,
            ScrollDirection::Down => self.scroll.y += self.scroll_speed,
            ScrollDirection::Left => self.scroll.x -= self.scroll_speed,
            ScrollDirection::Right => self.scroll.x += self.scroll_speed,
        }
    }

    /// Apply mouse wheel notches; positive values zoom out. Nodes never
    /// shrink below the configured minimum.
    pub fn zoom(&mut self, wheel: f32) {
        let factor = (100.0 - self.zoom_speed * wheel) / 100.0;
        self.node_size = (self.node_size * factor).max(self.node_min_size);
    }
}
