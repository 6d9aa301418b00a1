/// Weather categories that add two points of severity on their own.
const SEVERE_CATEGORIES: &[&str] = &["Thunderstorm", "Snow"];

/// Weather fields the severity heuristic looks at. Every field may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherConditions<'a> {
    pub precipitation_mm: Option<f64>,
    pub visibility_m: Option<f64>,
    pub weather_category: Option<&'a str>,
}

impl WeatherConditions<'_> {
    /// Additive severity index in `0..=4`.
    ///
    /// | Rule                                    | Points |
    /// |-----------------------------------------|--------|
    /// | precipitation_mm > 0.5                  | +1     |
    /// | visibility_m < 5000                     | +1     |
    /// | category is Thunderstorm or Snow        | +2     |
    ///
    /// Absent fields contribute nothing.
    pub fn severity_index(&self) -> u8 {
        let mut severity = 0;
        if self.precipitation_mm.is_some_and(|p| p > 0.5) {
            severity += 1;
        }
        if self.visibility_m.is_some_and(|v| v < 5000.0) {
            severity += 1;
        }
        if self
            .weather_category
            .is_some_and(|c| SEVERE_CATEGORIES.contains(&c))
        {
            severity += 2;
        }
        severity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(
        precipitation_mm: Option<f64>,
        visibility_m: Option<f64>,
        weather_category: Option<&str>,
    ) -> WeatherConditions<'_> {
        WeatherConditions {
            precipitation_mm,
            visibility_m,
            weather_category,
        }
    }

    #[test]
    fn test_all_absent_is_zero() {
        assert_eq!(WeatherConditions::default().severity_index(), 0);
    }

    #[test]
    fn test_rule_boundaries() {
        assert_eq!(conditions(Some(0.5), None, None).severity_index(), 0);
        assert_eq!(conditions(Some(0.51), None, None).severity_index(), 1);
        assert_eq!(conditions(None, Some(5000.0), None).severity_index(), 0);
        assert_eq!(conditions(None, Some(4999.0), None).severity_index(), 1);
        assert_eq!(conditions(None, None, Some("Rain")).severity_index(), 0);
        assert_eq!(conditions(None, None, Some("Snow")).severity_index(), 2);
        assert_eq!(conditions(None, None, Some("Thunderstorm")).severity_index(), 2);
    }

    #[test]
    fn test_rules_are_additive() {
        assert_eq!(
            conditions(Some(3.0), Some(200.0), Some("Thunderstorm")).severity_index(),
            4
        );
        assert_eq!(conditions(Some(3.0), None, Some("Snow")).severity_index(), 3);
    }

    #[test]
    fn test_index_equals_sum_of_rules() {
        let precips = [None, Some(0.0), Some(0.6)];
        let visibilities = [None, Some(10000.0), Some(100.0)];
        let categories = [None, Some("Clear"), Some("Snow"), Some("Thunderstorm")];

        for p in precips {
            for v in visibilities {
                for c in categories {
                    let expected = u8::from(p.is_some_and(|x| x > 0.5))
                        + u8::from(v.is_some_and(|x| x < 5000.0))
                        + 2 * u8::from(matches!(c, Some("Snow") | Some("Thunderstorm")));
                    let got = conditions(p, v, c).severity_index();
                    assert_eq!(got, expected);
                    assert!(got <= 4);
                }
            }
        }
    }
}
