// Pure indicator math over ordered bar sequences
// No I/O, no suspension, always returns a number

use crate::types::Bar;

/// Average close over the last `periods` bars. With fewer bars than periods
/// the last close stands in; an empty slice yields 0.0.
pub fn moving_average(bars: &[Bar], periods: usize) -> f64 {
    if bars.len() >= periods {
        let relevant = &bars[bars.len() - periods..];
        let sum: f64 = relevant.iter().map(|bar| bar.close).sum();
        sum / periods as f64
    } else {
        bars.last().map(|bar| bar.close).unwrap_or(0.0)
    }
}

/// RSI over the last `periods` bars. A zero delta counts as a loss of 0,
/// neither gain nor price decline. Single-bar input returns the neutral 50.0;
/// no losses at all returns 100.0.
pub fn relative_strength_index(bars: &[Bar], periods: usize) -> f64 {
    let start = bars.len().saturating_sub(periods);
    let relevant = &bars[start..];

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in relevant.windows(2) {
        let change = pair[1].close - pair[0].close;
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    let num_periods = relevant.len().saturating_sub(1);
    if num_periods == 0 {
        return 50.0;
    }
    let avg_gain = gains / num_periods as f64;
    let avg_loss = losses / num_periods as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Stamp the three indicator fields on a freshly admitted bar, using the
/// window's trailing 9 bars plus the bar itself.
pub fn stamp_indicators(bar: &mut Bar, trailing: &[Bar]) {
    let start = trailing.len().saturating_sub(9);
    let mut context: Vec<Bar> = trailing[start..].to_vec();
    context.push(bar.clone());
    bar.five_period_ma = moving_average(&context, 5);
    bar.ten_period_ma = moving_average(&context, 10);
    bar.six_period_rsi = relative_strength_index(&context, 6);
}
