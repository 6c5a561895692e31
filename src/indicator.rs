//! Sighting classification and the status LED pulse that shows it.
//!
//! New devices flash red. Repeats flash blue when a position fix is known
//! and yellow when it is not, which doubles as a GPS indicator in the field.

/// How a qualifying sighting is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    RepeatWithPosition,
    RepeatWithoutPosition,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::RepeatWithPosition => "repeat_fix",
            Classification::RepeatWithoutPosition => "repeat_nofix",
        }
    }

    pub fn color(&self) -> Rgb {
        match self {
            Classification::New => Rgb::RED,
            Classification::RepeatWithPosition => Rgb::BLUE,
            Classification::RepeatWithoutPosition => Rgb::YELLOW,
        }
    }
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    pub const YELLOW: Rgb = Rgb::new(255, 255, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// WS2812/SK6812 wire order: green, red, blue, MSB first.
    pub fn to_grb_u32(self) -> u32 {
        ((self.g as u32) << 16) | ((self.r as u32) << 8) | self.b as u32
    }
}

/// Renders one short pulse per qualifying sighting, then goes dark.
/// Implementations must not block the pipeline for longer than the pulse.
pub trait StatusIndicator {
    fn signal(&mut self, class: Classification);
}

impl<I: StatusIndicator + ?Sized> StatusIndicator for &mut I {
    fn signal(&mut self, class: Classification) {
        (**self).signal(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_renders_distinct_from_repeats() {
        let new = Classification::New.color();
        assert_ne!(new, Classification::RepeatWithPosition.color());
        assert_ne!(new, Classification::RepeatWithoutPosition.color());
        assert_ne!(
            Classification::RepeatWithPosition.color(),
            Classification::RepeatWithoutPosition.color()
        );
    }

    #[test]
    fn labels_are_distinct() {
        assert_eq!(Classification::New.as_str(), "new");
        assert_ne!(
            Classification::RepeatWithPosition.as_str(),
            Classification::RepeatWithoutPosition.as_str()
        );
    }

    #[test]
    fn grb_packing() {
        assert_eq!(Rgb::RED.to_grb_u32(), 0x00_FF_00);
        assert_eq!(Rgb::new(1, 2, 3).to_grb_u32(), 0x02_01_03);
        assert_eq!(Rgb::OFF.to_grb_u32(), 0);
    }
}
