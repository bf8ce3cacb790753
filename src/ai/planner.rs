//! Idea generation and design-document drafting on top of [`ChatClient`].

use serde::{Deserialize, Serialize};

use crate::market::Region;

use super::{array_under_keys, strip_code_fences, AiError, ChatClient, ChatMessage};

/// Engine choices offered to the model verbatim.
pub const ENGINES: [&str; 5] = ["Unity", "Unreal Engine", "Godot", "RPG Maker", "Other"];

pub const IDEAS_REQUESTED: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameIdea {
    pub title: String,
    pub genre: String,
    pub core_system: String,
    pub target_users: String,
    pub differentiation: String,
    #[serde(default)]
    pub references: Option<String>,
}

const IDEA_SYSTEM_PROMPT: &str = "You are a game planning expert. \
Respond with a JSON array only. \
Output pure JSON without markdown code fences.";

const DOC_SYSTEM_PROMPT: &str = "You are a senior game designer. \
You write detailed, professional game design documents in markdown.";

fn idea_user_prompt(
    keywords: &[String],
    engine: &str,
    region: Region,
    market_report: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Propose {IDEAS_REQUESTED} innovative game ideas based on the trend keywords and \
conditions below.\n\n\
[Trend keywords]\n{}\n\n\
[Conditions]\n\
- Game engine: {engine}\n\
- Target region: {}\n\
- Reflect current trends\n\
- Each idea must have a clear differentiator\n",
        keywords.join(", "),
        region.label(),
    );
    if let Some(report) = market_report {
        prompt.push_str("\n[Market analysis]\n");
        prompt.push_str(report);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRespond in this JSON format:\n\
[\n\
  {\n\
    \"title\": \"game title\",\n\
    \"genre\": \"genre\",\n\
    \"core_system\": \"core system description (2-3 sentences)\",\n\
    \"target_users\": \"target audience\",\n\
    \"differentiation\": \"differentiating points\",\n\
    \"references\": \"2-3 reference games and which element each contributes\"\n\
  }\n\
]",
    );
    prompt
}

fn doc_user_prompt(idea: &GameIdea, engine: &str) -> String {
    format!(
        "Write a detailed game design document based on the idea below.\n\n\
[Game idea]\n\
- Title: {title}\n\
- Genre: {genre}\n\
- Core system: {core}\n\
- Target users: {users}\n\
- Differentiation: {diff}\n\
- Game engine: {engine}\n\n\
Write in markdown, covering these sections:\n\n\
# {title} - Game Design Document\n\n\
## 1. Overview\n\
(genre, platform, target users, game concept)\n\n\
## 2. Fun Factors\n\
(core fun, player motivation, retention hooks)\n\n\
## 3. Core Systems\n\
(main gameplay loop, 3-5 major systems in detail)\n\n\
## 4. Content Structure\n\
(stage/map/world layout, character and item systems, progression)\n\n\
## 5. Monetization\n\
(business model strategy, paid elements, expected ARPU range)\n\n\
## 6. Development Difficulty\n\
(technical challenges, estimated timeline, required team size)",
        title = idea.title,
        genre = idea.genre,
        core = idea.core_system,
        users = idea.target_users,
        diff = idea.differentiation,
    )
}

/// Asks for [`IDEAS_REQUESTED`] ideas. The model sometimes wraps the array
/// in fences or under an `ideas` key; both shapes are accepted.
pub async fn generate_game_ideas(
    client: &ChatClient,
    keywords: &[String],
    engine: &str,
    region: Region,
    market_report: Option<&str>,
) -> Result<Vec<GameIdea>, AiError> {
    let messages = [
        ChatMessage::system(IDEA_SYSTEM_PROMPT),
        ChatMessage::user(idea_user_prompt(keywords, engine, region, market_report)),
    ];
    let raw = client.complete(&messages, false).await?;
    let cleaned = strip_code_fences(&raw);
    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| AiError::parse(e.to_string(), &cleaned))?;
    let rows = array_under_keys(&value, &["ideas"])
        .ok_or_else(|| AiError::parse("expected a JSON array of ideas", &cleaned))?;
    let ideas: Vec<GameIdea> = rows
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(|e| AiError::parse(e.to_string(), &cleaned))?;
    if ideas.is_empty() {
        return Err(AiError::parse("model returned zero ideas", &cleaned));
    }
    Ok(ideas)
}

/// Expands one selected idea into a markdown design document.
pub async fn generate_design_document(
    client: &ChatClient,
    idea: &GameIdea,
    engine: &str,
) -> Result<String, AiError> {
    let messages = [
        ChatMessage::system(DOC_SYSTEM_PROMPT),
        ChatMessage::user(doc_user_prompt(idea, engine)),
    ];
    client.complete(&messages, false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idea_prompt_carries_keywords_engine_and_region() {
        let keywords = vec!["roguelike".to_string(), "deck builder".to_string()];
        let prompt = idea_user_prompt(&keywords, "Godot", Region::Us, None);
        assert!(prompt.contains("roguelike, deck builder"));
        assert!(prompt.contains("Game engine: Godot"));
        assert!(prompt.contains("Target region: United States"));
        assert!(!prompt.contains("[Market analysis]"));
    }

    #[test]
    fn doc_prompt_names_all_six_sections() {
        let idea = GameIdea {
            title: "Drift Keep".into(),
            genre: "tower defense".into(),
            core_system: "tides move the map each wave".into(),
            target_users: "midcore strategy players".into(),
            differentiation: "terrain is the resource".into(),
            references: None,
        };
        let prompt = doc_user_prompt(&idea, "Unity");
        for section in [
            "## 1. Overview",
            "## 2. Fun Factors",
            "## 3. Core Systems",
            "## 4. Content Structure",
            "## 5. Monetization",
            "## 6. Development Difficulty",
        ] {
            assert!(prompt.contains(section), "missing {section}");
        }
        assert!(prompt.contains("# Drift Keep - Game Design Document"));
    }

    #[test]
    fn ideas_parse_from_bare_array_and_wrapped_object() {
        let bare = r#"[{"title":"A","genre":"rpg","core_system":"x","target_users":"y","differentiation":"z"}]"#;
        let value: serde_json::Value = serde_json::from_str(bare).unwrap();
        let rows = array_under_keys(&value, &["ideas"]).unwrap();
        let ideas: Vec<GameIdea> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ideas[0].title, "A");
        assert!(ideas[0].references.is_none());

        let wrapped = format!(r#"{{"ideas":{bare}}}"#);
        let value: serde_json::Value = serde_json::from_str(&wrapped).unwrap();
        assert_eq!(array_under_keys(&value, &["ideas"]).unwrap().len(), 1);
    }
}
