//! Scoped gradient tracking.
//!
//! candle records the autodiff graph per tensor, so "disabling" gradients for
//! a sub-call means cutting the graph at the sub-call's output. Nothing used
//! inside a disabled scope can then receive a gradient from a loss computed on
//! the result, and there is no global flag that could be left in the wrong
//! state when the sub-call fails.

use candle_core::Tensor;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMode {
    Enabled,
    Disabled,
}

impl GradMode {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

/// Run `f` and, under [`GradMode::Disabled`], detach its output from the graph.
pub fn scoped<F>(mode: GradMode, f: F) -> Result<Tensor>
where
    F: FnOnce() -> Result<Tensor>,
{
    let out = f()?;
    match mode {
        GradMode::Enabled => Ok(out),
        GradMode::Disabled => {
            tracing::trace!("detaching {:?} from the autodiff graph", out.dims());
            Ok(out.detach())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn loss_through(mode: GradMode, w: &Var, xs: &Tensor) -> Tensor {
        let ys = scoped(mode, || Ok(xs.broadcast_mul(w.as_tensor())?)).unwrap();
        ys.sqr().unwrap().sum_all().unwrap()
    }

    #[test]
    fn enabled_scope_keeps_the_graph() {
        let dev = Device::Cpu;
        let w = Var::new(&[2f32], &dev).unwrap();
        let xs = Tensor::new(&[1f32, 2.0, 3.0], &dev).unwrap();
        let grads = loss_through(GradMode::Enabled, &w, &xs).backward().unwrap();
        let g: Vec<f32> = grads.get(w.as_tensor()).unwrap().to_vec1().unwrap();
        // d/dw sum((w x)^2) = 2 w sum(x^2) = 2 * 2 * 14
        assert!((g[0] - 56.0).abs() < 1e-4);
    }

    #[test]
    fn disabled_scope_cuts_the_graph() {
        let dev = Device::Cpu;
        let w = Var::new(&[2f32], &dev).unwrap();
        let xs = Tensor::new(&[1f32, 2.0, 3.0], &dev).unwrap();
        let grads = loss_through(GradMode::Disabled, &w, &xs).backward().unwrap();
        assert!(grads.get(w.as_tensor()).is_none());
    }

    #[test]
    fn errors_propagate_out_of_the_scope() {
        let result = scoped(GradMode::Disabled, || {
            Err(crate::Error::Contract("inner failure".into()))
        });
        assert!(matches!(result, Err(crate::Error::Contract(_))));
    }

    #[test]
    fn mode_from_flag() {
        assert_eq!(GradMode::from_enabled(true), GradMode::Enabled);
        assert!(!GradMode::from_enabled(false).is_enabled());
    }
}
