use num_complex::Complex64;

/// Formats a float like Python's `repr(float)`: shortest round-trip digits,
/// positional notation for decimal exponents in `-4..16`, and a mandatory
/// fractional part.
pub fn to_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() { "inf" } else { "-inf" }.to_owned();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. `-1.2345e6`
    let sci = format!("{value:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or_default();
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if digits.len() > int_len {
                format!("{sign}{}.{}", &digits[..int_len], &digits[int_len..])
            } else {
                let zeros = "0".repeat(int_len - digits.len());
                format!("{sign}{digits}{zeros}.0")
            }
        } else {
            let zeros = "0".repeat((-exp - 1) as usize);
            format!("{sign}0.{zeros}{digits}")
        }
    } else {
        let (head, tail) = digits.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        if tail.is_empty() {
            format!("{sign}{head}e{exp_sign}{:02}", exp.abs())
        } else {
            format!("{sign}{head}.{tail}e{exp_sign}{:02}", exp.abs())
        }
    }
}

fn complex_part(value: f64) -> String {
    let s = to_repr(value);
    match s.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_owned(),
        None => s,
    }
}

/// Formats a complex number like Python's `repr(complex)`.
pub fn complex_repr(value: Complex64) -> String {
    if value.re == 0.0 && value.re.is_sign_positive() {
        return format!("{}j", complex_part(value.im));
    }
    let (sign, im) = if value.im.is_sign_negative() && !value.im.is_nan() {
        ('-', -value.im)
    } else {
        ('+', value.im)
    };
    format!("({}{sign}{}j)", complex_part(value.re), complex_part(im))
}
