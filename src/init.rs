//! One-time parameter adjustments applied right after construction.

use candle_nn::VarMap;

use crate::{Error, Result};

/// Multiply, in place, every variable of `varmap` whose name starts with `prefix`.
///
/// Returns the number of variables touched.
pub fn scale_vars(varmap: &VarMap, prefix: &str, factor: f64) -> Result<usize> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| Error::Contract("variable map lock is poisoned".into()))?;
    let mut scaled = 0;
    for (_, var) in data.iter().filter(|(name, _)| name.starts_with(prefix)) {
        let value = (var.as_tensor() * factor)?;
        var.set(&value)?;
        scaled += 1;
    }
    tracing::debug!(prefix, factor, scaled, "scaled variables");
    Ok(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::Init;

    #[test]
    fn scales_only_matching_prefix() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        varmap
            .get((2, 3), "encoder.conv.weight", Init::Const(2.0), DType::F32, &dev)
            .unwrap();
        varmap
            .get(3, "decoder.conv.weight", Init::Const(2.0), DType::F32, &dev)
            .unwrap();

        let n = scale_vars(&varmap, "encoder.", 0.5).unwrap();
        assert_eq!(n, 1);

        let data = varmap.data().lock().unwrap();
        let enc: Vec<f32> = data["encoder.conv.weight"]
            .as_tensor()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert!(enc.iter().all(|&v| (v - 1.0).abs() < 1e-6));
        let dec: Vec<f32> = data["decoder.conv.weight"].as_tensor().to_vec1().unwrap();
        assert!(dec.iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }
}
