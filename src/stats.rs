use itertools::Itertools;
use std::time::Duration;

/// Summary statistics over the inter-tap intervals of one finished window.
///
/// Only produced when more than two intervals were recorded; below that the
/// sample variance is meaningless, and the summary is absent rather than
/// zeroed out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    /// Mean interval, in seconds.
    pub mean: f64,
    /// Sample variance (divisor `count - 1`), in seconds squared.
    pub variance: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Sample statistics over an ordered run of inter-tap intervals.
///
/// Pure and deterministic for a given input sequence, up to the usual
/// floating-point summation error.
pub fn summarize(intervals: &[Duration]) -> Option<Summary> {
    if intervals.len() <= 2 {
        return None;
    }

    let secs: Vec<f64> = intervals.iter().map(|d| d.as_secs_f64()).collect();
    let count = secs.len();
    let mean = mean(&secs)?;
    let variance = secs
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / (count - 1) as f64;
    let (min, max) = intervals.iter().minmax().into_option()?;

    Some(Summary {
        count,
        mean,
        variance,
        std_dev: variance.sqrt(),
        min: min.as_secs_f64(),
        max: max.as_secs_f64(),
    })
}
