use std::collections::HashMap;
use strum::EnumIter;
use thiserror::Error;

/// The closed set of reading types the service can generate. Wire names are
/// camelCase; the lowercase spellings some older clients send are accepted
/// as aliases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum ReadingType {
    Tarot,
    Numerology,
    Astrology,
    Oracle,
    Runes,
    IChing,
    AngelNumbers,
    Horoscope,
    DreamAnalysis,
    Magic8Ball,
    Aura,
    PastLife,
}

/// Sampling parameters and system prompt for one reading type, fixed for
/// the process lifetime.
#[derive(Clone, Copy, Debug)]
pub struct ReadingConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: &'static str,
}

impl ReadingType {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "tarot" => Some(Self::Tarot),
            "numerology" => Some(Self::Numerology),
            "astrology" => Some(Self::Astrology),
            "oracle" => Some(Self::Oracle),
            "runes" => Some(Self::Runes),
            "iching" => Some(Self::IChing),
            "angelNumbers" | "angelnumbers" => Some(Self::AngelNumbers),
            "horoscope" => Some(Self::Horoscope),
            "dreamAnalysis" | "dreamanalysis" => Some(Self::DreamAnalysis),
            "magic8ball" => Some(Self::Magic8Ball),
            "aura" => Some(Self::Aura),
            "pastlife" => Some(Self::PastLife),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Tarot => "tarot",
            Self::Numerology => "numerology",
            Self::Astrology => "astrology",
            Self::Oracle => "oracle",
            Self::Runes => "runes",
            Self::IChing => "iching",
            Self::AngelNumbers => "angelNumbers",
            Self::Horoscope => "horoscope",
            Self::DreamAnalysis => "dreamAnalysis",
            Self::Magic8Ball => "magic8ball",
            Self::Aura => "aura",
            Self::PastLife => "pastlife",
        }
    }

    /// Fields that must be present and non-empty in the user input before a
    /// prompt can be built.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Tarot => &["question"],
            Self::Numerology => &["fullname", "birthdate"],
            Self::Astrology => &["birthdate", "birthplace"],
            Self::Oracle => &["question"],
            Self::Runes => &["question"],
            Self::IChing => &["question"],
            Self::AngelNumbers => &["name", "number"],
            Self::Horoscope => &["zodiac"],
            Self::DreamAnalysis => &["dream"],
            Self::Magic8Ball => &["question"],
            Self::Aura => &["feelings"],
            Self::PastLife => &["name", "recurringExperiences"],
        }
    }

    pub fn config(&self) -> ReadingConfig {
        match self {
            Self::Tarot => ReadingConfig {
                max_tokens: 1000,
                temperature: 0.7,
                system_prompt: "You are an experienced tarot reader with deep knowledge of the 78-card deck. Provide a structured reading that includes: \n1. The cards drawn (choose these intuitively)\n2. Individual card interpretations\n3. How the cards interact\n4. Overall message and guidance\nUse markdown headers (###) to separate sections.",
            },
            Self::Numerology => ReadingConfig {
                max_tokens: 800,
                temperature: 0.6,
                system_prompt: "You are a skilled numerologist. Analyze the numerical patterns and provide insights into:\n1. Life Path Number\n2. Destiny Number\n3. Soul Urge Number\n4. Personality Traits\n5. Life Purpose\nUse markdown headers (###) for each section.",
            },
            Self::Astrology => ReadingConfig {
                max_tokens: 1000,
                temperature: 0.7,
                system_prompt: "You are an expert astrologer. Provide a detailed reading covering:\n1. Sun Sign Characteristics\n2. Current Planetary Influences\n3. Life Areas Affected\n4. Upcoming Opportunities and Challenges\nUse markdown headers (###) for each section.",
            },
            Self::Oracle => ReadingConfig {
                max_tokens: 600,
                temperature: 0.8,
                system_prompt: "You are an intuitive oracle card reader. Draw 3 cards and provide:\n1. Card Messages\n2. How they relate to the question\n3. Guidance and Action Steps\nUse markdown headers (###) for each section.",
            },
            Self::Runes => ReadingConfig {
                max_tokens: 700,
                temperature: 0.7,
                system_prompt: "You are a rune master versed in Elder Futhark. Draw 3 runes and provide:\n1. Individual Rune Meanings\n2. Combined Interpretation\n3. Practical Guidance\nUse markdown headers (###) for each section.",
            },
            Self::IChing => ReadingConfig {
                max_tokens: 800,
                temperature: 0.6,
                system_prompt: "You are an I Ching master. Generate a hexagram and provide:\n1. Hexagram Name and Number\n2. Core Message\n3. Changing Lines (if any)\n4. Practical Application\nUse markdown headers (###) to separate sections.",
            },
            Self::AngelNumbers => ReadingConfig {
                max_tokens: 500,
                temperature: 0.7,
                system_prompt: "You are an angel number interpreter. Provide insights into:\n1. Number Significance\n2. Angelic Message\n3. Guidance for Implementation\nUse markdown headers (###) for each section.",
            },
            Self::Horoscope => ReadingConfig {
                max_tokens: 600,
                temperature: 0.7,
                system_prompt: "You are an astrologer providing daily guidance. Cover:\n1. General Overview\n2. Love & Relationships\n3. Career & Goals\n4. Health & Well-being\nUse markdown headers (###) for each section.",
            },
            Self::DreamAnalysis => ReadingConfig {
                max_tokens: 700,
                temperature: 0.8,
                system_prompt: "You are a dream interpreter. Analyze the dream by:\n1. Symbol Meanings\n2. Emotional Context\n3. Personal Significance\n4. Guidance Message\nUse markdown headers (###) for each section.",
            },
            Self::Magic8Ball => ReadingConfig {
                max_tokens: 20,
                temperature: 0.9,
                system_prompt: "You are a Magic 8 Ball. Provide ONLY short, classic Magic 8 Ball responses (e.g., \"It is certain\", \"Ask again later\", \"Don't count on it\"). Keep responses to 5 words or less. Never provide explanations.",
            },
            Self::Aura => ReadingConfig {
                max_tokens: 800,
                temperature: 0.7,
                system_prompt: "You are an experienced aura reader. Provide insights into:\n1. Dominant Aura Colors\n2. Energy Patterns\n3. Chakra Balance\n4. Practical Energy Maintenance\nUse markdown headers (###) to separate sections.",
            },
            Self::PastLife => ReadingConfig {
                max_tokens: 1000,
                temperature: 0.8,
                system_prompt: "You are a past life reader. Create a narrative covering:\n1. Time Period Overview\n2. Past Life Identity\n3. Key Life Events\n4. Connection to Present\n5. Lessons & Influences\nUse markdown headers (###) to separate sections.",
            },
        }
    }
}

/// A validated prompt, ready to send to the completion API.
#[derive(Clone, Debug)]
pub struct BuiltPrompt {
    pub system_prompt: &'static str,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// Validates `user_input` against the reading type's required fields and
/// interpolates the per-type user prompt. Optional fields contribute their
/// clause only when present and non-empty.
pub fn build_prompt(
    reading_type: ReadingType,
    user_input: &HashMap<String, String>,
) -> Result<BuiltPrompt, PromptError> {
    let missing: Vec<_> = reading_type
        .required_fields()
        .iter()
        .copied()
        .filter(|name| user_input.get(*name).map_or(true, |value| value.trim().is_empty()))
        .collect();
    if !missing.is_empty() {
        return Err(PromptError::MissingFields(missing));
    }

    let field = |name: &str| user_input[name].trim();
    let optional = |name: &str| {
        user_input
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    };

    let user_prompt = match reading_type {
        ReadingType::Tarot => {
            format!("Provide a tarot reading for this question: {}", field("question"))
        }
        ReadingType::Numerology => format!(
            "Analyze the numerological significance of {}, born on {}",
            field("fullname"),
            field("birthdate")
        ),
        ReadingType::Astrology => {
            let mut prompt = format!(
                "Analyze the celestial influences for someone born on {}",
                field("birthdate")
            );
            if let Some(birthtime) = optional("birthtime") {
                prompt.push_str(&format!(" at {birthtime}"));
            }
            prompt.push_str(&format!(" in {}", field("birthplace")));
            prompt
        }
        ReadingType::Oracle => {
            format!("Interpret the oracle cards for: {}", field("question"))
        }
        ReadingType::Runes => format!("Cast the runes for: {}", field("question")),
        ReadingType::IChing => {
            format!("Consult the I Ching regarding: {}", field("question"))
        }
        ReadingType::AngelNumbers => format!(
            "Interpret the significance of {} for {}",
            field("number"),
            field("name")
        ),
        ReadingType::Horoscope => {
            format!("Provide a detailed horoscope for {}", field("zodiac"))
        }
        ReadingType::DreamAnalysis => format!("Interpret this dream: {}", field("dream")),
        ReadingType::Magic8Ball => field("question").to_string(),
        ReadingType::Aura => format!(
            "Read the aura and energy based on current feelings: {}",
            field("feelings")
        ),
        ReadingType::PastLife => {
            let mut prompt = format!(
                "Explore the past lives of {} based on recurring dreams or experiences: {}",
                field("name"),
                field("recurringExperiences")
            );
            if let Some(fears) = optional("fearsAndAttractions") {
                prompt.push_str(&format!(", unexplained fears or attractions: {fears}"));
            }
            if let Some(talents) = optional("naturalTalents") {
                prompt.push_str(&format!(", and natural abilities: {talents}"));
            }
            prompt
        }
    };

    let config = reading_type.config();
    Ok(BuiltPrompt {
        system_prompt: config.system_prompt,
        user_prompt,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    })
}
