//! Contrast-limited adaptive histogram equalization over an 8-bit plane, plus
//! the 8-bit sRGB <-> CIE L*a*b* conversion used to isolate lightness.
//!
//! Lab values follow the common 8-bit encoding: L scaled to 0..=255, a and b
//! offset by 128.

const BINS: usize = 256;

#[derive(Debug, Clone)]
pub struct ClaheParams {
    pub clip_limit: f32,
    pub tiles_x: usize,
    pub tiles_y: usize,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 3.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

/// Equalizes a row-major `width * height` plane.
pub fn apply(plane: &[u8], width: usize, height: usize, params: &ClaheParams) -> Vec<u8> {
    if width == 0 || height == 0 {
        return plane.to_vec();
    }
    let tiles_x = params.tiles_x.max(1);
    let tiles_y = params.tiles_y.max(1);

    // Pad up to a whole number of tiles with reflect-101 borders.
    let padded_w = width.div_ceil(tiles_x) * tiles_x;
    let padded_h = height.div_ceil(tiles_y) * tiles_y;
    let tile_w = padded_w / tiles_x;
    let tile_h = padded_h / tiles_y;
    let tile_area = tile_w * tile_h;

    let clip = if params.clip_limit > 0.0 {
        ((params.clip_limit * tile_area as f32 / BINS as f32) as usize).max(1)
    } else {
        0
    };
    let lut_scale = (BINS - 1) as f32 / tile_area as f32;

    let mut luts = vec![[0u8; BINS]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; BINS];
            for py in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(py, height);
                for px in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(px, width);
                    hist[plane[sy * width + sx] as usize] += 1;
                }
            }
            if clip > 0 {
                clip_histogram(&mut hist, clip);
            }

            let lut = &mut luts[ty * tiles_x + tx];
            let mut sum = 0usize;
            for (i, count) in hist.iter().enumerate() {
                sum += count;
                lut[i] = saturate(sum as f32 * lut_scale);
            }
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let mut out = vec![0u8; width * height];

    for y in 0..height {
        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor() as isize;
        let ya = tyf - ty1 as f32;
        let ty2 = (ty1 + 1).min(tiles_y as isize - 1) as usize;
        let ty1 = ty1.max(0) as usize;

        for x in 0..width {
            let txf = x as f32 * inv_tw - 0.5;
            let tx1 = txf.floor() as isize;
            let xa = txf - tx1 as f32;
            let tx2 = (tx1 + 1).min(tiles_x as isize - 1) as usize;
            let tx1 = tx1.max(0) as usize;

            let v = plane[y * width + x] as usize;
            let top = luts[ty1 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                + luts[ty1 * tiles_x + tx2][v] as f32 * xa;
            let bottom = luts[ty2 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                + luts[ty2 * tiles_x + tx2][v] as f32 * xa;
            out[y * width + x] = saturate(top * (1.0 - ya) + bottom * ya);
        }
    }
    out
}

fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut clipped = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let batch = clipped / BINS;
    let mut residual = clipped - batch * BINS;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn reflect_101(i: usize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i % period;
    if m < len { m } else { period - m }
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

const XN: f32 = 0.950456;
const ZN: f32 = 1.088754;
const LAB_EPSILON: f32 = 0.008856;

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240479, -1.537150, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];

pub fn rgb_to_lab(rgb: [u8; 3]) -> [u8; 3] {
    let lin = rgb.map(|c| srgb_to_linear(c as f32 / 255.0));
    let [x, y, z] = mul(&RGB_TO_XYZ, lin);

    let fx = lab_f(x / XN);
    let fy = lab_f(y);
    let fz = lab_f(z / ZN);

    let l = if y > LAB_EPSILON { 116.0 * fy - 16.0 } else { 903.3 * y };
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    [saturate(l * 255.0 / 100.0), saturate(a + 128.0), saturate(b + 128.0)]
}

pub fn lab_to_rgb(lab: [u8; 3]) -> [u8; 3] {
    let l = lab[0] as f32 * 100.0 / 255.0;
    let a = lab[1] as f32 - 128.0;
    let b = lab[2] as f32 - 128.0;

    let fy = (l + 16.0) / 116.0;
    let y = if l > 903.3 * LAB_EPSILON { fy * fy * fy } else { l / 903.3 };
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let xyz = [lab_f_inv(fx) * XN, y, lab_f_inv(fz) * ZN];
    mul(&XYZ_TO_RGB, xyz).map(|c| saturate(linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0))
}

fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 { 12.92 * c } else { 1.055 * c.powf(1.0 / 2.4) - 0.055 }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON { t.cbrt() } else { 7.787 * t + 16.0 / 116.0 }
}

fn lab_f_inv(f: f32) -> f32 {
    if f > 0.206893 { f * f * f } else { (f - 16.0 / 116.0) / 7.787 }
}
