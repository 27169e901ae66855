//! Individual element ratios `[X/Fe]`.
//!
//! Alpha elements are fitted through the `[alpha/Fe]` dimension on their own
//! lines; the other metals through `[Fe/H]`, reported relative to the final
//! iron abundance.

use crate::domain::{Atmosphere, Element, ElementDimension, ElementRatio, ParamBounds, Param};
use crate::error::AppError;
use crate::fit::lm::LmOptions;
use crate::fit::model::{FitRequest, NormalizedSpectrum, SpectrumModel, fit_parameters};
use crate::mask::{FitMasks, indices};

/// Inputs shared by every element fit.
pub struct ElementFitInput<'a> {
    pub model: &'a SpectrumModel<'a>,
    pub obs: &'a NormalizedSpectrum,
    pub masks: &'a FitMasks,
    /// Final atmosphere; only the element's dimension is refitted.
    pub atm: Atmosphere,
    pub bounds: ParamBounds,
    pub min_pixels: usize,
}

/// Measure every element in `elements` that has enough pixels.
///
/// Numerical failures on one element are logged and the element is omitted;
/// other errors abort.
pub fn fit_elements(
    input: &ElementFitInput<'_>,
    elements: &[Element],
    opts: &LmOptions,
) -> Result<Vec<ElementRatio>, AppError> {
    let mut out = Vec::new();
    for &element in elements {
        let idx = indices(input.masks.element(element));
        if idx.len() < input.min_pixels {
            tracing::debug!(
                element = element.symbol(),
                npix = idx.len(),
                "too few pixels, skipping element"
            );
            continue;
        }

        match fit_element(input, element, &idx, opts) {
            Ok(ratio) => out.push(ratio),
            Err(e) if e.exit_code() == 4 => {
                tracing::warn!(element = element.symbol(), error = %e, "element fit failed");
            }
            Err(e) => return Err(e.context(format!("[{}/Fe]", element.symbol()))),
        }
    }
    Ok(out)
}

fn fit_element(
    input: &ElementFitInput<'_>,
    element: Element,
    idx: &[usize],
    opts: &LmOptions,
) -> Result<ElementRatio, AppError> {
    let param = match element.dimension() {
        ElementDimension::Alpha => Param::AlphaFe,
        ElementDimension::Metal => Param::FeH,
    };
    let params = [param];
    let request = FitRequest {
        base: input.atm,
        params: &params,
        bounds: &[input.bounds.range(param)],
        prior: None,
    };
    let fit = fit_parameters(input.model, input.obs, idx, &request, opts)?;
    let m = fit.measurement(&params, param);

    let value = match element.dimension() {
        ElementDimension::Alpha => m.value,
        ElementDimension::Metal => m.value - input.atm.feh,
    };
    tracing::debug!(element = element.symbol(), value, npix = idx.len(), "element ratio");

    Ok(ElementRatio {
        element,
        value,
        error: m.error,
        npix: idx.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResolutionMode, Spectrum};
    use crate::fit::model::tests::{observed_wvl, red_library};
    use crate::instrument::dispersion_sigma;
    use crate::mask::MaskSet;

    #[test]
    fn calcium_follows_alpha_and_sparse_elements_are_skipped() {
        let lib = red_library();
        let wvl = observed_wvl();
        let sigma = dispersion_sigma(&wvl, ResolutionMode::Mr);
        let model = SpectrumModel::new(&lib, &wvl, &sigma);
        let truth = Atmosphere::new(4500.0, 1.5, -1.5, 0.4);
        let spectrum = Spectrum {
            wvl: wvl.clone(),
            flux: model.synthesize_all(&truth).unwrap(),
            ivar: vec![1e4; wvl.len()],
        };
        let obs = NormalizedSpectrum::new(&spectrum, &vec![1.0; wvl.len()]);
        let masks = FitMasks::build(&wvl, &spectrum, &MaskSet::default());

        let input = ElementFitInput {
            model: &model,
            obs: &obs,
            masks: &masks,
            atm: Atmosphere::new(4500.0, 1.5, -1.5, 0.0),
            bounds: ParamBounds {
                lower: Atmosphere::new(4000.0, 0.5, -3.0, -0.4),
                upper: Atmosphere::new(5000.0, 2.5, -0.5, 0.8),
            },
            min_pixels: 5,
        };
        let ratios = fit_elements(&input, &[Element::Ca, Element::Ba], &LmOptions::default())
            .unwrap();
        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios[0].element, Element::Ca);
        assert!((ratios[0].value - 0.4).abs() < 0.01, "[Ca/Fe]={}", ratios[0].value);
        assert!(ratios[0].npix >= 5);
    }
}
