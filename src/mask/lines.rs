//! Built-in line lists (air wavelengths, Angstrom).
//!
//! These seed the default `MaskSet`; survey-specific masks can replace them
//! through a JSON mask file.

use crate::domain::Element;

pub const FE_LINES: &[f64] = &[
    4132.06, 4143.87, 4187.04, 4202.03, 4260.47, 4271.76, 4383.55, 4404.75, 4415.12, 4528.61,
    4871.32, 4890.76, 4891.49, 4919.00, 4920.50, 4957.60, 5006.12, 5012.07, 5041.76, 5051.63,
    5079.74, 5083.34, 5110.41, 5171.60, 5194.94, 5232.94, 5266.56, 5269.54, 5324.18, 5328.04,
    5371.49, 5397.13, 5405.77, 5429.70, 5434.52, 5446.92, 5455.61, 5497.52, 5501.47, 5506.78,
    5569.62, 5586.76, 5615.64, 6136.61, 6137.69, 6191.56, 6230.72, 6252.56, 6335.33, 6393.60,
    6400.00, 6421.35, 6430.85, 6494.98, 6592.91, 6677.99, 7495.07, 7511.02, 7748.27, 7780.56,
    8327.05, 8387.77, 8468.41, 8514.07, 8621.60, 8688.62, 8824.22,
];

const MG_LINES: &[f64] = &[
    4571.10, 4702.99, 5167.32, 5172.68, 5183.60, 5528.41, 5711.09, 8717.83, 8736.02, 8806.76,
];
const SI_LINES: &[f64] = &[
    5684.48, 5690.43, 5708.40, 5772.15, 5948.54, 7405.77, 7415.95, 7423.50, 7932.35, 7944.00,
];
const CA_LINES: &[f64] = &[
    4226.73, 4425.44, 4434.96, 4454.78, 5588.75, 5857.45, 6102.72, 6122.22, 6162.17, 6439.08,
    6449.81, 6493.78, 6717.69, 8498.02, 8542.09, 8662.14,
];
const TI_LINES: &[f64] = &[
    4533.24, 4534.78, 4981.73, 4991.07, 4999.50, 5007.21, 5039.96, 5064.65, 5192.97, 5210.39,
    5866.45, 6258.10, 8426.50, 8434.96,
];
const CR_LINES: &[f64] = &[4254.33, 4274.80, 4289.72, 5206.04, 5208.42, 5345.80, 5409.78];
const MN_LINES: &[f64] = &[4754.04, 4783.43, 4823.52, 6013.51, 6016.64, 6021.82];
const CO_LINES: &[f64] = &[4121.32, 4792.86, 5483.34, 5647.23];
const NI_LINES: &[f64] = &[
    4714.42, 4829.03, 5035.36, 5476.90, 6643.64, 6767.77, 7788.93, 7797.59,
];
const BA_LINES: &[f64] = &[4554.03, 5853.68, 6141.71, 6496.90];
const Y_LINES: &[f64] = &[4883.68, 5087.42, 5200.41, 5205.72];

pub fn element_lines(element: Element) -> &'static [f64] {
    match element {
        Element::Mg => MG_LINES,
        Element::Si => SI_LINES,
        Element::Ca => CA_LINES,
        Element::Ti => TI_LINES,
        Element::Cr => CR_LINES,
        Element::Mn => MN_LINES,
        Element::Co => CO_LINES,
        Element::Ni => NI_LINES,
        Element::Ba => BA_LINES,
        Element::Y => Y_LINES,
    }
}

/// H-delta, H-gamma, H-beta, H-alpha.
pub const BALMER_LINES: &[f64] = &[4101.74, 4340.47, 4861.33, 6562.80];

/// Atmospheric absorption bands `[lo, hi]`.
pub const TELLURIC_BANDS: &[(f64, f64)] = &[
    (6864.0, 6935.0),
    (7165.0, 7325.0),
    (7591.0, 7694.0),
    (8938.0, 9100.0),
];
