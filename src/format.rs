//! Translation of Vulkan color formats to hardware encodings.
//!
//! The color block describes an attachment with a (format, numeric type,
//! component swap) triple; the SPI describes a color export with one of ten
//! export formats. Everything in this module is a pure function of the
//! format, so the tables are shared freely between threads.

use ash::vk;

use crate::core::gpu_info::GpuInfo;

// CB_COLOR_ATTRIB format field values.
pub const COLOR_INVALID: u32 = 0;
pub const COLOR_8: u32 = 1;
pub const COLOR_16: u32 = 2;
pub const COLOR_8_8: u32 = 3;
pub const COLOR_32: u32 = 4;
pub const COLOR_16_16: u32 = 5;
pub const COLOR_10_11_11: u32 = 6;
pub const COLOR_11_11_10: u32 = 7;
pub const COLOR_10_10_10_2: u32 = 8;
pub const COLOR_2_10_10_10: u32 = 9;
pub const COLOR_8_8_8_8: u32 = 10;
pub const COLOR_32_32: u32 = 11;
pub const COLOR_16_16_16_16: u32 = 12;
pub const COLOR_32_32_32_32: u32 = 14;
pub const COLOR_5_6_5: u32 = 16;
pub const COLOR_1_5_5_5: u32 = 17;
pub const COLOR_5_5_5_1: u32 = 18;
pub const COLOR_4_4_4_4: u32 = 19;
pub const COLOR_5_9_9_9: u32 = 24;

// Numeric type field values.
pub const NUMBER_UNORM: u32 = 0;
pub const NUMBER_SNORM: u32 = 1;
pub const NUMBER_UINT: u32 = 4;
pub const NUMBER_SINT: u32 = 5;
pub const NUMBER_SRGB: u32 = 6;
pub const NUMBER_FLOAT: u32 = 7;

// Component swap field values.
pub const SWAP_STD: u32 = 0;
pub const SWAP_ALT: u32 = 1;
pub const SWAP_STD_REV: u32 = 2;
pub const SWAP_ALT_REV: u32 = 3;

// SPI_SHADER_COL_FORMAT values (4 bits per render target).
pub const SPI_SHADER_ZERO: u32 = 0;
pub const SPI_SHADER_32_R: u32 = 1;
pub const SPI_SHADER_32_GR: u32 = 2;
pub const SPI_SHADER_32_AR: u32 = 3;
pub const SPI_SHADER_FP16_ABGR: u32 = 4;
pub const SPI_SHADER_UNORM16_ABGR: u32 = 5;
pub const SPI_SHADER_SNORM16_ABGR: u32 = 6;
pub const SPI_SHADER_UINT16_ABGR: u32 = 7;
pub const SPI_SHADER_SINT16_ABGR: u32 = 8;
pub const SPI_SHADER_32_ABGR: u32 = 9;

/// Hardware encoding of a color attachment format.
///
/// An unsupported format yields [`ColorEncoding::ZERO`]; the blend reducer
/// observes this and masks the attachment out instead of failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColorEncoding {
    pub hw_format: u32,
    pub ntype: u32,
    pub swap: u32,
    pub is_int8: bool,
    pub is_int10: bool,
    pub is_float32: bool,
}

impl ColorEncoding {
    /// Sentinel for formats the color block cannot store.
    pub const ZERO: ColorEncoding = ColorEncoding {
        hw_format: COLOR_INVALID,
        ntype: NUMBER_UNORM,
        swap: SWAP_STD,
        is_int8: false,
        is_int10: false,
        is_float32: false,
    };

    pub fn is_valid(&self) -> bool {
        self.hw_format != COLOR_INVALID
    }
}

const fn enc(hw_format: u32, ntype: u32, swap: u32) -> ColorEncoding {
    ColorEncoding {
        hw_format,
        ntype,
        swap,
        is_int8: (ntype == NUMBER_UINT || ntype == NUMBER_SINT)
            && (hw_format == COLOR_8 || hw_format == COLOR_8_8 || hw_format == COLOR_8_8_8_8),
        is_int10: (ntype == NUMBER_UINT || ntype == NUMBER_SINT)
            && (hw_format == COLOR_2_10_10_10 || hw_format == COLOR_10_10_10_2),
        is_float32: ntype == NUMBER_FLOAT
            && (hw_format == COLOR_32 || hw_format == COLOR_32_32 || hw_format == COLOR_32_32_32_32),
    }
}

/// Translate a Vulkan color format to its hardware encoding.
pub fn color_encoding(format: vk::Format) -> ColorEncoding {
    match format {
        vk::Format::R8_UNORM => enc(COLOR_8, NUMBER_UNORM, SWAP_STD),
        vk::Format::R8_SNORM => enc(COLOR_8, NUMBER_SNORM, SWAP_STD),
        vk::Format::R8_UINT => enc(COLOR_8, NUMBER_UINT, SWAP_STD),
        vk::Format::R8_SINT => enc(COLOR_8, NUMBER_SINT, SWAP_STD),

        vk::Format::R8G8_UNORM => enc(COLOR_8_8, NUMBER_UNORM, SWAP_STD),
        vk::Format::R8G8_SNORM => enc(COLOR_8_8, NUMBER_SNORM, SWAP_STD),
        vk::Format::R8G8_UINT => enc(COLOR_8_8, NUMBER_UINT, SWAP_STD),
        vk::Format::R8G8_SINT => enc(COLOR_8_8, NUMBER_SINT, SWAP_STD),

        vk::Format::R8G8B8A8_UNORM => enc(COLOR_8_8_8_8, NUMBER_UNORM, SWAP_STD),
        vk::Format::R8G8B8A8_SNORM => enc(COLOR_8_8_8_8, NUMBER_SNORM, SWAP_STD),
        vk::Format::R8G8B8A8_UINT => enc(COLOR_8_8_8_8, NUMBER_UINT, SWAP_STD),
        vk::Format::R8G8B8A8_SINT => enc(COLOR_8_8_8_8, NUMBER_SINT, SWAP_STD),
        vk::Format::R8G8B8A8_SRGB => enc(COLOR_8_8_8_8, NUMBER_SRGB, SWAP_STD),
        vk::Format::B8G8R8A8_UNORM => enc(COLOR_8_8_8_8, NUMBER_UNORM, SWAP_ALT),
        vk::Format::B8G8R8A8_SRGB => enc(COLOR_8_8_8_8, NUMBER_SRGB, SWAP_ALT),
        vk::Format::A8B8G8R8_UNORM_PACK32 => enc(COLOR_8_8_8_8, NUMBER_UNORM, SWAP_STD),
        vk::Format::A8B8G8R8_SRGB_PACK32 => enc(COLOR_8_8_8_8, NUMBER_SRGB, SWAP_STD),

        vk::Format::R5G6B5_UNORM_PACK16 => enc(COLOR_5_6_5, NUMBER_UNORM, SWAP_STD_REV),
        vk::Format::B5G6R5_UNORM_PACK16 => enc(COLOR_5_6_5, NUMBER_UNORM, SWAP_STD),
        vk::Format::A1R5G5B5_UNORM_PACK16 => enc(COLOR_1_5_5_5, NUMBER_UNORM, SWAP_ALT),
        vk::Format::R5G5B5A1_UNORM_PACK16 => enc(COLOR_5_5_5_1, NUMBER_UNORM, SWAP_ALT_REV),
        vk::Format::R4G4B4A4_UNORM_PACK16 => enc(COLOR_4_4_4_4, NUMBER_UNORM, SWAP_ALT_REV),
        vk::Format::B4G4R4A4_UNORM_PACK16 => enc(COLOR_4_4_4_4, NUMBER_UNORM, SWAP_ALT),

        vk::Format::R16_UNORM => enc(COLOR_16, NUMBER_UNORM, SWAP_STD),
        vk::Format::R16_SNORM => enc(COLOR_16, NUMBER_SNORM, SWAP_STD),
        vk::Format::R16_UINT => enc(COLOR_16, NUMBER_UINT, SWAP_STD),
        vk::Format::R16_SINT => enc(COLOR_16, NUMBER_SINT, SWAP_STD),
        vk::Format::R16_SFLOAT => enc(COLOR_16, NUMBER_FLOAT, SWAP_STD),

        vk::Format::R16G16_UNORM => enc(COLOR_16_16, NUMBER_UNORM, SWAP_STD),
        vk::Format::R16G16_SNORM => enc(COLOR_16_16, NUMBER_SNORM, SWAP_STD),
        vk::Format::R16G16_UINT => enc(COLOR_16_16, NUMBER_UINT, SWAP_STD),
        vk::Format::R16G16_SINT => enc(COLOR_16_16, NUMBER_SINT, SWAP_STD),
        vk::Format::R16G16_SFLOAT => enc(COLOR_16_16, NUMBER_FLOAT, SWAP_STD),

        vk::Format::R16G16B16A16_UNORM => enc(COLOR_16_16_16_16, NUMBER_UNORM, SWAP_STD),
        vk::Format::R16G16B16A16_SNORM => enc(COLOR_16_16_16_16, NUMBER_SNORM, SWAP_STD),
        vk::Format::R16G16B16A16_UINT => enc(COLOR_16_16_16_16, NUMBER_UINT, SWAP_STD),
        vk::Format::R16G16B16A16_SINT => enc(COLOR_16_16_16_16, NUMBER_SINT, SWAP_STD),
        vk::Format::R16G16B16A16_SFLOAT => enc(COLOR_16_16_16_16, NUMBER_FLOAT, SWAP_STD),

        vk::Format::R32_UINT => enc(COLOR_32, NUMBER_UINT, SWAP_STD),
        vk::Format::R32_SINT => enc(COLOR_32, NUMBER_SINT, SWAP_STD),
        vk::Format::R32_SFLOAT => enc(COLOR_32, NUMBER_FLOAT, SWAP_STD),
        vk::Format::R32G32_UINT => enc(COLOR_32_32, NUMBER_UINT, SWAP_STD),
        vk::Format::R32G32_SINT => enc(COLOR_32_32, NUMBER_SINT, SWAP_STD),
        vk::Format::R32G32_SFLOAT => enc(COLOR_32_32, NUMBER_FLOAT, SWAP_STD),
        vk::Format::R32G32B32A32_UINT => enc(COLOR_32_32_32_32, NUMBER_UINT, SWAP_STD),
        vk::Format::R32G32B32A32_SINT => enc(COLOR_32_32_32_32, NUMBER_SINT, SWAP_STD),
        vk::Format::R32G32B32A32_SFLOAT => enc(COLOR_32_32_32_32, NUMBER_FLOAT, SWAP_STD),

        vk::Format::A2R10G10B10_UNORM_PACK32 => enc(COLOR_2_10_10_10, NUMBER_UNORM, SWAP_ALT),
        vk::Format::A2R10G10B10_UINT_PACK32 => enc(COLOR_2_10_10_10, NUMBER_UINT, SWAP_ALT),
        vk::Format::A2B10G10R10_UNORM_PACK32 => enc(COLOR_2_10_10_10, NUMBER_UNORM, SWAP_STD),
        vk::Format::A2B10G10R10_UINT_PACK32 => enc(COLOR_2_10_10_10, NUMBER_UINT, SWAP_STD),

        vk::Format::B10G11R11_UFLOAT_PACK32 => enc(COLOR_10_11_11, NUMBER_FLOAT, SWAP_STD),
        vk::Format::E5B9G9R9_UFLOAT_PACK32 => enc(COLOR_5_9_9_9, NUMBER_FLOAT, SWAP_STD),

        _ => ColorEncoding::ZERO,
    }
}

/// Select the narrowest color export format consistent with blending and
/// source-alpha requirements.
///
/// With RB+ present the returned values are the exact formats RB+ requires;
/// without it the 16-bit normalized formats may keep their native export
/// even when blending, since the backend then blends in place.
pub fn choose_export_format(
    gpu: &GpuInfo,
    format: vk::Format,
    blend_enable: bool,
    needs_src_alpha: bool,
) -> u32 {
    let e = color_encoding(format);
    if !e.is_valid() {
        return SPI_SHADER_ZERO;
    }

    // The four variants mirror the hardware table: plain export, export that
    // must carry alpha, blending export, and blending export with alpha.
    let mut normal;
    let mut alpha;
    let mut blend;
    let mut blend_alpha;

    match e.hw_format {
        COLOR_5_6_5 | COLOR_1_5_5_5 | COLOR_5_5_5_1 | COLOR_4_4_4_4 | COLOR_10_11_11
        | COLOR_5_9_9_9 | COLOR_8 | COLOR_8_8 | COLOR_8_8_8_8 | COLOR_10_10_10_2
        | COLOR_2_10_10_10 => {
            let f = match e.ntype {
                NUMBER_UINT => SPI_SHADER_UINT16_ABGR,
                NUMBER_SINT => SPI_SHADER_SINT16_ABGR,
                _ => SPI_SHADER_FP16_ABGR,
            };
            normal = f;
            alpha = f;
            blend = f;
            blend_alpha = f;
        }
        COLOR_16 | COLOR_16_16 | COLOR_16_16_16_16 => match e.ntype {
            NUMBER_UNORM | NUMBER_SNORM => {
                let native = if e.ntype == NUMBER_UNORM {
                    SPI_SHADER_UNORM16_ABGR
                } else {
                    SPI_SHADER_SNORM16_ABGR
                };
                normal = native;
                alpha = native;
                if !gpu.rbplus_allowed {
                    blend = native;
                    blend_alpha = native;
                } else {
                    // RB+ blends 16-bit norm through 32-bit exports.
                    match e.hw_format {
                        COLOR_16 => {
                            blend = SPI_SHADER_32_R;
                            blend_alpha = SPI_SHADER_32_AR;
                        }
                        COLOR_16_16 => {
                            blend = SPI_SHADER_32_GR;
                            blend_alpha = SPI_SHADER_32_ABGR;
                        }
                        _ => {
                            blend = SPI_SHADER_32_ABGR;
                            blend_alpha = SPI_SHADER_32_ABGR;
                        }
                    }
                }
            }
            NUMBER_UINT => {
                normal = SPI_SHADER_UINT16_ABGR;
                alpha = normal;
                blend = normal;
                blend_alpha = normal;
            }
            NUMBER_SINT => {
                normal = SPI_SHADER_SINT16_ABGR;
                alpha = normal;
                blend = normal;
                blend_alpha = normal;
            }
            _ => {
                normal = SPI_SHADER_FP16_ABGR;
                alpha = normal;
                blend = normal;
                blend_alpha = normal;
            }
        },
        COLOR_32 => {
            if e.swap == SWAP_STD {
                normal = SPI_SHADER_32_R;
                blend = SPI_SHADER_32_R;
                alpha = SPI_SHADER_32_AR;
                blend_alpha = SPI_SHADER_32_AR;
            } else {
                // Single alpha channel.
                normal = SPI_SHADER_32_AR;
                alpha = normal;
                blend = normal;
                blend_alpha = normal;
            }
        }
        COLOR_32_32 => {
            if e.swap == SWAP_STD {
                normal = SPI_SHADER_32_GR;
                blend = SPI_SHADER_32_GR;
                alpha = SPI_SHADER_32_ABGR;
                blend_alpha = SPI_SHADER_32_ABGR;
            } else {
                normal = SPI_SHADER_32_AR;
                alpha = normal;
                blend = normal;
                blend_alpha = normal;
            }
        }
        COLOR_32_32_32_32 => {
            normal = SPI_SHADER_32_ABGR;
            alpha = normal;
            blend = normal;
            blend_alpha = normal;
        }
        _ => {
            normal = SPI_SHADER_ZERO;
            alpha = normal;
            blend = normal;
            blend_alpha = normal;
        }
    }

    // SRGB conversion runs after the export, which must stay float.
    if e.ntype == NUMBER_SRGB {
        normal = SPI_SHADER_FP16_ABGR;
        alpha = normal;
        blend = normal;
        blend_alpha = normal;
    }

    match (blend_enable, needs_src_alpha) {
        (true, true) => blend_alpha,
        (true, false) => blend,
        (false, true) => alpha,
        (false, false) => normal,
    }
}

/// Bytes per pixel of a color format, 0 when unsupported.
pub fn byte_size(format: vk::Format) -> u32 {
    match color_encoding(format).hw_format {
        COLOR_8 => 1,
        COLOR_8_8 | COLOR_16 | COLOR_5_6_5 | COLOR_1_5_5_5 | COLOR_5_5_5_1 | COLOR_4_4_4_4 => 2,
        COLOR_8_8_8_8 | COLOR_32 | COLOR_16_16 | COLOR_10_11_11 | COLOR_11_11_10
        | COLOR_10_10_10_2 | COLOR_2_10_10_10 | COLOR_5_9_9_9 => 4,
        COLOR_16_16_16_16 | COLOR_32_32 => 8,
        COLOR_32_32_32_32 => 16,
        _ => 0,
    }
}

/// The depth/stencil block can store this format.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Bytes per pixel of a depth/stencil format pair.
pub fn depth_byte_size(depth: Option<vk::Format>, stencil: Option<vk::Format>) -> u32 {
    let d = match depth {
        Some(vk::Format::D16_UNORM) => 2,
        Some(vk::Format::D32_SFLOAT) | Some(vk::Format::D32_SFLOAT_S8_UINT) => 4,
        Some(vk::Format::D24_UNORM_S8_UINT) | Some(vk::Format::X8_D24_UNORM_PACK32) => 4,
        Some(vk::Format::D16_UNORM_S8_UINT) => 2,
        _ => 0,
    };
    let s = if stencil.is_some() { 1 } else { 0 };
    d + s
}

/// Exemplar formats for internal meta operations (clears, blits). The dense
/// meta key of `META_EXEMPLARS[i]` is `i`.
pub const META_EXEMPLARS: [vk::Format; 10] = [
    vk::Format::R8_UNORM,
    vk::Format::R8G8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::A2B10G10R10_UNORM_PACK32,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R32_SFLOAT,
    vk::Format::R32G32_SFLOAT,
    vk::Format::R32G32B32A32_SFLOAT,
    vk::Format::B10G11R11_UFLOAT_PACK32,
];

/// Dense index used as a key for internal meta pipelines. Formats that share
/// an exemplar share a key; unsupported formats return `None`.
pub fn meta_key(format: vk::Format) -> Option<u32> {
    let idx = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT => 0,
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SNORM | vk::Format::R8G8_UINT
        | vk::Format::R8G8_SINT => 1,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::A8B8G8R8_UNORM_PACK32
        | vk::Format::A8B8G8R8_SRGB_PACK32 => 2,
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => 3,
        vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::A2B10G10R10_UINT_PACK32
        | vk::Format::A2R10G10B10_UNORM_PACK32
        | vk::Format::A2R10G10B10_UINT_PACK32 => 4,
        vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SNORM
        | vk::Format::R16G16B16A16_UINT
        | vk::Format::R16G16B16A16_SINT
        | vk::Format::R16_SFLOAT
        | vk::Format::R16_UNORM
        | vk::Format::R16_SNORM
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16_UNORM
        | vk::Format::R16G16_SNORM
        | vk::Format::R16G16_UINT
        | vk::Format::R16G16_SINT => 5,
        vk::Format::R32_SFLOAT | vk::Format::R32_UINT | vk::Format::R32_SINT => 6,
        vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT | vk::Format::R32G32_SINT => 7,
        vk::Format::R32G32B32A32_SFLOAT
        | vk::Format::R32G32B32A32_UINT
        | vk::Format::R32G32B32A32_SINT => 8,
        vk::Format::B10G11R11_UFLOAT_PACK32 | vk::Format::E5B9G9R9_UFLOAT_PACK32 => 9,
        _ => return None,
    };
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu_info::GfxLevel;

    #[test]
    fn unsupported_format_is_masked() {
        let e = color_encoding(vk::Format::R64_SFLOAT);
        assert!(!e.is_valid());
        assert_eq!(e, ColorEncoding::ZERO);
    }

    #[test]
    fn int_classification() {
        assert!(color_encoding(vk::Format::R8G8B8A8_UINT).is_int8);
        assert!(color_encoding(vk::Format::A2B10G10R10_UINT_PACK32).is_int10);
        assert!(color_encoding(vk::Format::R32_SFLOAT).is_float32);
        assert!(!color_encoding(vk::Format::R8G8B8A8_UNORM).is_int8);
    }

    #[test]
    fn export_format_narrowing() {
        let gpu = GpuInfo::new(GfxLevel::Gfx11);
        // Plain 8-bit color exports as packed fp16.
        assert_eq!(
            choose_export_format(&gpu, vk::Format::R8G8B8A8_UNORM, false, false),
            SPI_SHADER_FP16_ABGR
        );
        // Single 32-bit channel narrows to one lane, widening for alpha.
        assert_eq!(
            choose_export_format(&gpu, vk::Format::R32_SFLOAT, false, false),
            SPI_SHADER_32_R
        );
        assert_eq!(
            choose_export_format(&gpu, vk::Format::R32_SFLOAT, false, true),
            SPI_SHADER_32_AR
        );
        // 16-bit norm blending goes through 32-bit exports on RB+ chips.
        assert_eq!(
            choose_export_format(&gpu, vk::Format::R16G16_UNORM, true, false),
            SPI_SHADER_32_GR
        );
    }

    #[test]
    fn meta_keys_are_dense_over_exemplars() {
        for (i, format) in META_EXEMPLARS.iter().enumerate() {
            assert_eq!(meta_key(*format), Some(i as u32));
        }
        assert_eq!(meta_key(vk::Format::R64_SFLOAT), None);
    }
}
