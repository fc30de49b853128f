use crate::image::Rect;
use crate::template::Template;

/// A template found in a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'t> {
    /// Horizontal position of the template origin in scene coordinates.
    pub x: i32,
    /// Vertical position of the template origin in scene coordinates.
    pub y: i32,
    /// Percentage of the maximum possible similarity, `0..=100`.
    pub score: f32,
    /// The matched template.
    pub template: &'t Template,
}

impl<'t> Match<'t> {
    /// Area covered by the template at the match position.
    pub fn bounding_rect(&self) -> Rect {
        let size = self.template.size();
        Rect::new(self.x, self.y, size.width, size.height)
    }

    pub fn center(&self) -> (f32, f32) {
        let size = self.template.size();
        (
            self.x as f32 + size.width as f32 / 2.0,
            self.y as f32 + size.height as f32 / 2.0,
        )
    }

    /// Template feature positions in scene coordinates.
    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> + 't {
        let (x, y) = (self.x, self.y);
        self.template.features().iter().map(move |f| {
            let moved = f.translated(x, y);
            (moved.x, moved.y)
        })
    }
}
