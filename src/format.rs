use crate::buffer::Frame;
use crate::error::Error;
use crate::property::HasProperties;
use crate::Result;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::{FromPrimitive, NumCast, PrimInt, ToPrimitive};



const FORMAT_COLOR_MASK: u32     = 0xFF000000;
const FORMAT_BIT_DEPTH_MASK: u32 = 0x00FF0000;
const FORMAT_MONO: u32           = 0x01000000;

/// GenICam PFNC pixel formats, by their PFNC code.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive)]
pub enum PixelFormat {
    #[default]
    Mono8 = 0x01080001,
    Mono10 = 0x01100003,
    Mono12 = 0x01100005,
    Mono14 = 0x01100025,
    Mono16 = 0x01100007,
    Mono10p = 0x010A0046,
    Mono12p = 0x010C0047,

    BayerGR8 = 0x01080008,
    BayerRG8 = 0x01080009,
    BayerGB8 = 0x0108000A,
    BayerBG8 = 0x0108000B,
    BayerGR10 = 0x0110000C,
    BayerRG10 = 0x0110000D,
    BayerGB10 = 0x0110000E,
    BayerBG10 = 0x0110000F,
    BayerGR12 = 0x01100010,
    BayerRG12 = 0x01100011,
    BayerGB12 = 0x01100012,
    BayerBG12 = 0x01100013,
    BayerGR16 = 0x0110002E,
    BayerRG16 = 0x0110002F,
    BayerGB16 = 0x01100030,
    BayerBG16 = 0x01100031,

    Rgb8 = 0x02180014,
    Bgr8 = 0x02180015,
    Rgba8 = 0x02200016,
    Bgra8 = 0x02200017
}

/// Color of the top-left 2x2 cell of a Bayer mosaic, row by row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BayerPattern { RG, GR, GB, BG }

impl BayerPattern {
    /// (row, column) of red and blue within the cell.
    fn red_blue(&self) -> ((usize, usize), (usize, usize)) {
        match self {
            BayerPattern::RG => ((0, 0), (1, 1)),
            BayerPattern::GR => ((0, 1), (1, 0)),
            BayerPattern::GB => ((1, 0), (0, 1)),
            BayerPattern::BG => ((1, 1), (0, 0))
        }
    }

    /// RGB channel index (0, 1 or 2) sampled at `(y, x)`.
    fn channel_at(&self, y: usize, x: usize) -> usize {
        let (r, b) = self.red_blue();

        match (y % 2, x % 2) {
            cell if cell == r => 0,
            cell if cell == b => 2,
            _ => 1
        }
    }
}

impl PixelFormat {
    pub fn from_code(code: i64) -> Option<Self> {
        Self::from_i64(code)
    }

    pub fn bits_per_pixel(&self) -> usize {
        const SHIFT: u32 = FORMAT_BIT_DEPTH_MASK.trailing_zeros();

        ((*self as u32 & FORMAT_BIT_DEPTH_MASK) >> SHIFT) as usize
    }

    /// Mono and Bayer formats are single channel.
    pub fn is_color(&self) -> bool {
        *self as u32 & FORMAT_COLOR_MASK != FORMAT_MONO
    }

    pub fn num_channels(&self) -> usize {
        use PixelFormat::*;

        match self {
            Rgb8 | Bgr8 => 3,
            Rgba8 | Bgra8 => 4,
            _ => 1
        }
    }

    pub fn bits_per_channel(&self) -> usize {
        self.bits_per_pixel() / self.num_channels()
    }

    pub fn bayer_pattern(&self) -> Option<BayerPattern> {
        use PixelFormat::*;

        match self {
            BayerRG8 | BayerRG10 | BayerRG12 | BayerRG16 => Some(BayerPattern::RG),
            BayerGR8 | BayerGR10 | BayerGR12 | BayerGR16 => Some(BayerPattern::GR),
            BayerGB8 | BayerGB10 | BayerGB12 | BayerGB16 => Some(BayerPattern::GB),
            BayerBG8 | BayerBG10 | BayerBG12 | BayerBG16 => Some(BayerPattern::BG),
            _ => None
        }
    }

    /// Widens every component to a `u16`. `None` for 8-bit formats.
    pub fn unpack_to_u16(&self, raw: &[u8]) -> Option<Vec<u16>> {
        use PixelFormat::*;

        match self {
            // Little endian, 2 bytes per component
            Mono10 | Mono12 | Mono14 | Mono16
            | BayerGR10 | BayerRG10 | BayerGB10 | BayerBG10
            | BayerGR12 | BayerRG12 | BayerGB12 | BayerBG12
            | BayerGR16 | BayerRG16 | BayerGB16 | BayerBG16 => {
                Some(raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect())
            },

            // LSB-first bit packing
            Mono10p | Mono12p => {
                let bits = self.bits_per_channel();
                let mask = (1u32 << bits) - 1;
                let n = raw.len() * 8 / bits;

                Some((0..n).map(|i| {
                    let start = i * bits;
                    let byte = start / 8;
                    let lo = raw[byte] as u32;
                    let hi = raw.get(byte + 1).copied().unwrap_or(0) as u32;

                    (((hi << 8 | lo) >> (start % 8)) & mask) as u16
                }).collect())
            },

            _ => None
        }
    }
}



/// Geometry and format of the frames a camera currently produces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    /// `None` when the camera reports a format this crate does not know.
    pub format: Option<PixelFormat>
}

impl FrameLayout {
    pub fn from_properties(device: &impl HasProperties) -> Result<Self> {
        let dimension = |name: &str| -> Result<usize> {
            let v = device.get_int(name)?;

            usize::try_from(v).map_err(|_| Error::InvalidArgument(format!("{name} is negative: {v}")))
        };

        Ok(Self {
            width: dimension("Width")?,
            height: dimension("Height")?,
            format: PixelFormat::from_code(device.get_enum("PixelFormat")?.value)
        })
    }
}



/// Half-resolution RGB from an 8-bit Bayer mosaic: each 2x2 cell becomes
/// one pixel, its two greens averaged.
pub fn bayer_downsample(data: &[u8], width: usize, height: usize, pattern: BayerPattern) -> Result<Vec<u8>> {
    if data.len() < width * height {
        return Err(Error::InvalidArgument(format!(
            "{} bytes is too short for a {width}x{height} frame", data.len()
        )));
    }

    let (r, b) = pattern.red_blue();
    let (g1, g2) = ((r.0, b.1), (b.0, r.1));

    let (out_w, out_h) = (width / 2, height / 2);
    let mut out = Vec::with_capacity(out_w * out_h * 3);

    for y in 0..out_h {
        for x in 0..out_w {
            let at = |(dy, dx): (usize, usize)| data[(2 * y + dy) * width + 2 * x + dx];
            let green = (at(g1) as u16 + at(g2) as u16) / 2;

            out.extend_from_slice(&[at(r), green as u8, at(b)]);
        }
    }

    Ok(out)
}

const ORTHOGONAL: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const DIAGONAL: [(isize, isize); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Full-resolution RGB from a Bayer mosaic by bilinear interpolation.
///
/// A missing channel is the rounded mean of the nearest samples of that
/// channel: the edge neighbours when there are any, the corner neighbours
/// otherwise. Neighbours outside the frame are left out of the mean, so
/// edges need no padding. Works on 8-bit samples as well as on 10 to 16-bit
/// ones widened with [`PixelFormat::unpack_to_u16`].
pub fn bayer_interpolate<T: PrimInt>(data: &[T], width: usize, height: usize, pattern: BayerPattern) -> Result<Vec<T>> {
    if width < 2 || height < 2 {
        return Err(Error::InvalidArgument(format!("a {width}x{height} frame holds no full Bayer cell")));
    }

    if data.len() < width * height {
        return Err(Error::InvalidArgument(format!(
            "{} samples is too short for a {width}x{height} frame", data.len()
        )));
    }

    let sample = |y: usize, x: usize| data[y * width + x].to_u32().unwrap_or(0);

    let mean = |y: usize, x: usize, channel: usize, offsets: &[(isize, isize)]| {
        let (sum, n) = offsets.iter()
            .filter_map(|&(dy, dx)| {
                let ny = y.checked_add_signed(dy).filter(|&ny| ny < height)?;
                let nx = x.checked_add_signed(dx).filter(|&nx| nx < width)?;

                (pattern.channel_at(ny, nx) == channel).then(|| sample(ny, nx))
            })
            .fold((0u32, 0u32), |(sum, n), v| (sum + v, n + 1));

        (n > 0).then(|| (sum + n / 2) / n)
    };

    let mut out = Vec::with_capacity(width * height * 3);

    for y in 0..height {
        for x in 0..width {
            let own = pattern.channel_at(y, x);

            for channel in 0..3 {
                let v = if channel == own {
                    sample(y, x)
                } else {
                    mean(y, x, channel, &ORTHOGONAL)
                        .or_else(|| mean(y, x, channel, &DIAGONAL))
                        .unwrap_or(0)
                };

                out.push(<T as NumCast>::from(v).unwrap_or_else(T::max_value));
            }
        }
    }

    Ok(out)
}

/// Interleaved RGB samples, as wide as the format they came from.
#[derive(Clone, Debug, PartialEq, Eq, EnumAsInner)]
pub enum Pixels {
    U8(Vec<u8>),
    U16(Vec<u16>)
}

impl Frame {
    /// Full-resolution RGB of a frame captured in any Bayer format. 8-bit
    /// formats give [`Pixels::U8`], wider ones [`Pixels::U16`] holding the
    /// unscaled sample values.
    pub fn to_rgb_interpolated(&self, layout: &FrameLayout) -> Result<Pixels> {
        let (format, pattern) = layout.format
            .and_then(|f| Some((f, f.bayer_pattern()?)))
            .ok_or_else(|| Error::InvalidArgument(format!("{:?} is not a Bayer format", layout.format)))?;

        match format.unpack_to_u16(&self.data) {
            Some(wide) => bayer_interpolate(&wide, layout.width, layout.height, pattern).map(Pixels::U16),
            None => bayer_interpolate(&self.data, layout.width, layout.height, pattern).map(Pixels::U8)
        }
    }

    /// Downsampled RGB of a frame captured in an 8-bit Bayer format.
    pub fn to_rgb_downsampled(&self, layout: &FrameLayout) -> Result<Vec<u8>> {
        let pattern = layout.format
            .filter(|f| f.bits_per_pixel() == 8)
            .and_then(|f| f.bayer_pattern())
            .ok_or_else(|| Error::InvalidArgument(format!("{:?} is not an 8-bit Bayer format", layout.format)))?;

        bayer_downsample(&self.data, layout.width, layout.height, pattern)
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_codes() {
        assert_eq!(PixelFormat::from_code(0x01080009), Some(PixelFormat::BayerRG8));
        assert_eq!(PixelFormat::from_code(0x1234), None);
        assert_eq!(PixelFormat::Mono12.bits_per_pixel(), 16);
        assert_eq!(PixelFormat::Mono12p.bits_per_channel(), 12);
        assert_eq!(PixelFormat::Rgb8.bits_per_channel(), 8);
        assert!(!PixelFormat::BayerBG8.is_color());
        assert!(PixelFormat::Bgra8.is_color());
    }

    #[test]
    fn unpack_12p() {
        // 0xABC and 0x123 packed LSB first
        let raw = [0xBC, 0x3A, 0x12];

        assert_eq!(PixelFormat::Mono12p.unpack_to_u16(&raw), Some(vec![0xABC, 0x123]));
        assert_eq!(PixelFormat::Mono8.unpack_to_u16(&raw), None);
    }

    #[test]
    fn unpack_16_bit_little_endian() {
        assert_eq!(PixelFormat::Mono16.unpack_to_u16(&[0x34, 0x12, 0xFF, 0x00]), Some(vec![0x1234, 0x00FF]));
    }

    #[test]
    fn downsample_rggb() {
        let raw = [
            10, 20, 11, 21,
            30, 40, 31, 41,
        ];

        let rgb = bayer_downsample(&raw, 4, 2, BayerPattern::RG).unwrap();

        assert_eq!(rgb, vec![10, 25, 40, 11, 26, 41]);
    }

    #[test]
    fn downsample_bggr_swaps_red_and_blue() {
        let raw = [40, 20, 30, 10];

        assert_eq!(bayer_downsample(&raw, 2, 2, BayerPattern::BG).unwrap(), vec![10, 25, 40]);
    }

    #[test]
    fn short_frame_is_rejected() {
        assert!(bayer_downsample(&[0; 3], 2, 2, BayerPattern::RG).is_err());
    }

    fn at(rgb: &[u8], width: usize, y: usize, x: usize) -> [u8; 3] {
        let i = (y * width + x) * 3;

        [rgb[i], rgb[i + 1], rgb[i + 2]]
    }

    #[test]
    fn interpolate_rggb() {
        let raw: Vec<u8> = (1..=16).map(|v| v * 10).collect();

        let rgb = bayer_interpolate(&raw, 4, 4, BayerPattern::RG).unwrap();

        assert_eq!(rgb.len(), 4 * 4 * 3);
        // red corner: blue only on the diagonal
        assert_eq!(at(&rgb, 4, 0, 0), [10, 35, 60]);
        // blue site: red from the four corners, green from the four edges
        assert_eq!(at(&rgb, 4, 1, 1), [60, 60, 60]);
        // green site on a blue row
        assert_eq!(at(&rgb, 4, 2, 1), [100, 100, 100]);
        // blue corner: one red corner neighbour inside the frame
        assert_eq!(at(&rgb, 4, 3, 3), [110, 135, 160]);
    }

    #[test]
    fn flat_colour_survives_every_pattern() {
        for pattern in [BayerPattern::RG, BayerPattern::GR, BayerPattern::GB, BayerPattern::BG] {
            let raw: Vec<u8> = (0..6 * 4)
                .map(|i| [100, 50, 200][pattern.channel_at(i / 6, i % 6)])
                .collect();

            let rgb = bayer_interpolate(&raw, 6, 4, pattern).unwrap();

            assert!(rgb.chunks_exact(3).all(|px| px == [100, 50, 200]), "{pattern:?}");
        }
    }

    #[test]
    fn interpolate_16_bit_frame() {
        let data = [1000u16, 2000, 3000, 4000].iter().flat_map(|v| v.to_le_bytes()).collect();
        let frame = Frame { data, timestamp: 0, image_id: 0, buffer_id: 0 };
        let layout = FrameLayout { width: 2, height: 2, format: Some(PixelFormat::BayerRG16) };

        let rgb = frame.to_rgb_interpolated(&layout).unwrap().into_u16().unwrap();

        assert_eq!(&rgb[..3], &[1000, 2500, 4000]);
        assert_eq!(&rgb[9..], &[1000, 2500, 4000]);
    }

    #[test]
    fn interpolate_8_bit_frame() {
        let frame = Frame { data: vec![40, 20, 30, 10], timestamp: 0, image_id: 0, buffer_id: 0 };
        let layout = FrameLayout { width: 2, height: 2, format: Some(PixelFormat::BayerBG8) };

        let rgb = frame.to_rgb_interpolated(&layout).unwrap();

        assert_eq!(rgb.as_u8().map(|p| &p[..3]), Some(&[10, 25, 40][..]));
    }

    #[test]
    fn interpolation_needs_a_full_cell() {
        assert!(bayer_interpolate(&[0u8; 4], 4, 1, BayerPattern::RG).is_err());
        assert!(bayer_interpolate(&[0u16; 3], 2, 2, BayerPattern::RG).is_err());
    }

    #[test]
    fn mono_frames_cannot_be_downsampled() {
        let frame = Frame { data: vec![0; 4], timestamp: 0, image_id: 0, buffer_id: 0 };
        let layout = FrameLayout { width: 2, height: 2, format: Some(PixelFormat::Mono8) };

        assert!(matches!(frame.to_rgb_downsampled(&layout), Err(Error::InvalidArgument(_))));
        assert!(matches!(frame.to_rgb_interpolated(&layout), Err(Error::InvalidArgument(_))));
    }
}
