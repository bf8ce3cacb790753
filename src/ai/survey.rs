//! AI-generated fan survey questions and team recommendations.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use super::{array_under_keys, strip_code_fences, AiError, ChatClient, ChatMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub id: String,
    #[serde(default)]
    pub category: String,
    pub question: String,
    pub options: Vec<SurveyOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPick {
    pub league: String,
    pub team: String,
    pub reason: String,
    #[serde(deserialize_with = "clamp_match_rate")]
    pub match_rate: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub personality_type: String,
    pub summary: String,
    pub recommendations: Vec<TeamPick>,
}

/// Models occasionally return rates outside 0..=100 or as negative numbers.
fn clamp_match_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, 100) as u8)
}

const SURVEY_SYSTEM_PROMPT: &str = "\
You are a witty analyst with deep insight into sports fans. \
Generate 10 personality-test questions for profiling a user's fan disposition.\n\
\n\
Guidelines:\n\
1. Generate exactly 10 questions, each probing a different disposition axis.\n\
2. Each question carries exactly 4 options labeled A through D.\n\
3. Options are short and punchy, written the way fans actually talk.\n\
4. Questions stay league-agnostic so they apply across baseball, football, \
and basketball.\n\
\n\
Respond only in this JSON array format:\n\
[\n\
  {\n\
    \"id\": \"q1\",\n\
    \"category\": \"cheering style\",\n\
    \"question\": \"What matters most when you pick a team?\",\n\
    \"options\": [\n\
      {\"label\": \"A. Deep tradition and a storied fanbase\", \"value\": \"tradition\"},\n\
      {\"label\": \"B. Trendy and winning right now\", \"value\": \"trendy\"},\n\
      {\"label\": \"C. Explodes out of nowhere once in a while\", \"value\": \"explosion\"},\n\
      {\"label\": \"D. Weak but with a story worth rooting for\", \"value\": \"story\"}\n\
    ]\n\
  }\n\
]";

const RECOMMEND_SYSTEM_PROMPT: &str = "\
You are an expert on professional sports leagues (baseball, football, \
basketball). Based on the user's disposition data, recommend the best-fit \
team in each league.\n\
\n\
Principles:\n\
1. Recommend exactly one team per league.\n\
2. Match the user's answer tendencies (offense vs defense, favorites vs \
underdogs) against each team's actual history and identity.\n\
3. Write the reason in a friendly, expert voice that speaks to the user \
directly.\n\
\n\
Respond only in this JSON format:\n\
{\n\
  \"personality_type\": \"the user's disposition in one phrase\",\n\
  \"summary\": \"overall analysis of the user's disposition\",\n\
  \"recommendations\": [\n\
    {\n\
      \"league\": \"league name\",\n\
      \"team\": \"team name\",\n\
      \"reason\": \"specific matching rationale\",\n\
      \"match_rate\": 0\n\
    }\n\
  ]\n\
}";

/// Forces a JSON response; accepts a bare array or one wrapped under
/// `questions` / `survey`. An empty result is a parse failure, not an
/// empty survey.
pub async fn generate_survey_questions(
    client: &ChatClient,
) -> Result<Vec<SurveyQuestion>, AiError> {
    let messages = [ChatMessage::system(SURVEY_SYSTEM_PROMPT)];
    let raw = client.complete(&messages, true).await?;
    let cleaned = strip_code_fences(&raw);
    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| AiError::parse(e.to_string(), &cleaned))?;
    let rows = array_under_keys(&value, &["questions", "survey"])
        .ok_or_else(|| AiError::parse("expected an array of survey questions", &cleaned))?;
    let questions: Vec<SurveyQuestion> = rows
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(|e| AiError::parse(e.to_string(), &cleaned))?;
    if questions.is_empty() {
        return Err(AiError::parse("model returned zero questions", &cleaned));
    }
    Ok(questions)
}

/// Strict object parse; the recommendation shape is fixed, so no fallback
/// keys here.
pub async fn recommend_teams(
    client: &ChatClient,
    answers: &IndexMap<String, String>,
) -> Result<RecommendationSet, AiError> {
    let serialized = serde_json::to_string(answers)
        .map_err(|e| AiError::parse(e.to_string(), "answers"))?;
    let messages = [
        ChatMessage::system(RECOMMEND_SYSTEM_PROMPT),
        ChatMessage::user(format!("User disposition data: {serialized}")),
    ];
    client.complete_json(&messages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn questions_parse_from_wrapped_object() {
        let payload = json!({
            "questions": [{
                "id": "q1",
                "category": "cheering style",
                "question": "What matters most?",
                "options": [
                    {"label": "A. Tradition", "value": "tradition"},
                    {"label": "B. Trendy", "value": "trendy"}
                ]
            }]
        });
        let rows = array_under_keys(&payload, &["questions", "survey"]).unwrap();
        let questions: Vec<SurveyQuestion> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].options.len(), 2);
    }

    #[test]
    fn missing_category_defaults_to_empty() {
        let row = json!({
            "id": "q2",
            "question": "Pick one",
            "options": []
        });
        let q: SurveyQuestion = serde_json::from_value(row).unwrap();
        assert_eq!(q.category, "");
    }

    #[test]
    fn match_rate_is_clamped() {
        let pick: TeamPick = serde_json::from_value(json!({
            "league": "KBO",
            "team": "Tigers",
            "reason": "history",
            "match_rate": 140
        }))
        .unwrap();
        assert_eq!(pick.match_rate, 100);

        let pick: TeamPick = serde_json::from_value(json!({
            "league": "KBL",
            "team": "Sonicboom",
            "reason": "pace",
            "match_rate": -5
        }))
        .unwrap();
        assert_eq!(pick.match_rate, 0);
    }

    #[test]
    fn recommendation_set_parses_strictly() {
        let set: RecommendationSet = serde_json::from_value(json!({
            "personality_type": "tactician with a hot heart",
            "summary": "values structure but loves a comeback",
            "recommendations": [{
                "league": "K League",
                "team": "FC Anyang",
                "reason": "underdog arc",
                "match_rate": 87
            }]
        }))
        .unwrap();
        assert_eq!(set.recommendations[0].match_rate, 87);
    }
}
