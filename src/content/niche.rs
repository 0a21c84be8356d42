//! Niche configuration and visual styling vocabulary.

use serde::{Deserialize, Serialize};

/// Color palette and prop vocabulary interpolated into image requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualStyle {
    pub color: String,
    pub props: String,
    pub lighting: String,
    pub style: String,
    pub angle: String,
}

impl VisualStyle {
    fn new(color: &str, props: &str, lighting: &str, style: &str, angle: &str) -> Self {
        Self {
            color: color.to_string(),
            props: props.to_string(),
            lighting: lighting.to_string(),
            style: style.to_string(),
            angle: angle.to_string(),
        }
    }
}

impl Default for VisualStyle {
    fn default() -> Self {
        Self::new(
            "pastel tones",
            "fresh flowers, linen texture",
            "soft diffused light",
            "lifestyle aesthetic",
            "slightly elevated 3/4 view",
        )
    }
}

/// A configured content sub-category: keywords for matching plus the visual
/// and hashtag vocabulary used when templating content for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicheConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub style: VisualStyle,
    pub hashtags: Vec<String>,
    /// Extra search terms appended when building the affiliate link.
    pub search_terms: String,
}

impl NicheConfig {
    /// Keywords from this niche found in `topic` (case-insensitive).
    pub fn matched_keywords(&self, topic: &str) -> Vec<String> {
        let topic = topic.to_lowercase();
        self.keywords
            .iter()
            .filter(|keyword| topic.contains(keyword.to_lowercase().as_str()))
            .cloned()
            .collect()
    }
}

/// The stock beauty niches: skincare, haircare, makeup.
pub fn default_niches() -> Vec<NicheConfig> {
    vec![
        NicheConfig {
            name: "skincare".to_string(),
            keywords: ["serum", "moisturizer", "retinol", "spf", "glow", "cream", "skin"]
                .into_iter()
                .map(String::from)
                .collect(),
            style: VisualStyle::new(
                "peach and champagne",
                "citrus slices, dewdrops",
                "soft natural lighting",
                "high-end beauty advertisement",
                "soft focus close-up",
            ),
            hashtags: ["#Skincare", "#GlowUp", "#BeautyTips", "#SelfCare"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_terms: "skincare+beauty".to_string(),
        },
        NicheConfig {
            name: "haircare".to_string(),
            keywords: ["shampoo", "conditioner", "mask", "scalp", "curls", "hair"]
                .into_iter()
                .map(String::from)
                .collect(),
            style: VisualStyle::new(
                "vibrant jewel tones",
                "wide-tooth comb, silk scarf",
                "studio lighting",
                "professional salon aesthetic",
                "dynamic diagonal composition",
            ),
            hashtags: ["#Haircare", "#HealthyHair", "#HairGoals", "#BeautyTips"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_terms: "hair+care+products".to_string(),
        },
        NicheConfig {
            name: "makeup".to_string(),
            keywords: [
                "lipstick",
                "foundation",
                "concealer",
                "blush",
                "mascara",
                "makeup",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            style: VisualStyle::new(
                "earth tones",
                "marble surface, pearls",
                "perfect editorial lighting",
                "modern editorial style",
                "flat lay with props",
            ),
            hashtags: ["#Makeup", "#MakeupLooks", "#BeautyInspo", "#Cosmetics"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_terms: "makeup+cosmetics".to_string(),
        },
    ]
}

/// Refine the visual style for known sub-niches detected in the topic text.
///
/// Falls back to the niche's own style when no sub-niche keyword matches.
pub fn subniche_style(topic: &str, niche: &NicheConfig) -> VisualStyle {
    let haystack = topic.to_lowercase();
    let tables: [(&[&str], VisualStyle); 7] = [
        (
            &["wrinkle", "aging", "mature", "anti-aging"],
            VisualStyle::new(
                "soft gold and ivory",
                "crystal roller, fresh roses",
                "warm sunrise glow",
                "luxury spa aesthetic",
                "slightly elevated 3/4 view",
            ),
        ),
        (
            &["acne", "blemish", "breakout", "clear skin"],
            VisualStyle::new(
                "clinical blue and white",
                "aloe vera plant, bamboo towel",
                "bright natural light",
                "clean medical look",
                "straight-on clinical angle",
            ),
        ),
        (
            &["glow", "radiance", "illuminating", "glass skin"],
            VisualStyle::new(
                "peach and champagne",
                "citrus slices, dewdrops",
                "soft diffused light",
                "ethereal glow",
                "soft focus close-up",
            ),
        ),
        (
            &["curl", "coily", "frizz", "natural hair"],
            VisualStyle::new(
                "vibrant jewel tones",
                "wide-tooth comb, silk scarf",
                "studio lighting",
                "textured close-up",
                "dynamic diagonal composition",
            ),
        ),
        (
            &["repair", "damage", "split end", "treatment"],
            VisualStyle::new(
                "deep emerald and gold",
                "olive branches, ceramic vase",
                "dramatic side light",
                "salon professional",
                "hero product shot from above",
            ),
        ),
        (
            &["clean", "organic", "non-toxic", "natural"],
            VisualStyle::new(
                "earth tones",
                "recycled packaging, plants",
                "natural daylight",
                "minimalist flat lay",
                "flat lay with props",
            ),
        ),
        (
            &["luxury", "premium", "high-end", "gold"],
            VisualStyle::new(
                "black and rose gold",
                "marble surface, pearls",
                "moody ambiance",
                "high-end editorial",
                "dramatic Dutch angle",
            ),
        ),
    ];

    for (terms, style) in tables {
        if terms.iter().any(|term| haystack.contains(term)) {
            return style;
        }
    }
    niche.style.clone()
}
