//! Serialization of typed plans into the store's aggregation language,
//! expressed as extended JSON (ObjectIds as `{"$oid": ..}`).

use serde_json::{json, Map, Value};

use catalog_core::product::fields;
use catalog_core::types::StoreScope;

use crate::stage::{
    Filter, MetaScore, Plan, Projection, RankFusion, Stage, TextSearch, VectorSearch, COUNT_BRANCH, DOCS_BRANCH,
    PRODUCT_FIELDS, TEXT_PIPELINE, TOTAL_FIELD, VECTOR_PIPELINE,
};

impl Plan {
    pub fn to_pipeline(&self) -> Vec<Value> {
        render_stages(&self.stages)
    }
}

pub fn render_stages(stages: &[Stage]) -> Vec<Value> {
    stages.iter().flat_map(render_stage).collect()
}

/// Extended-JSON form of a store identifier.
pub fn scope_value(scope: &StoreScope) -> Value {
    if scope.is_object_id() {
        json!({ "$oid": scope.as_str() })
    } else {
        json!(scope.as_str())
    }
}

fn render_stage(stage: &Stage) -> Vec<Value> {
    match stage {
        Stage::Match(filter) => vec![json!({ "$match": match_filter(filter) })],
        Stage::TextSearch(t) => vec![json!({ "$search": text_search(t) })],
        Stage::VectorSearch(v) => vec![json!({ "$vectorSearch": vector_search(v) })],
        Stage::RankFusion(f) => vec![json!({ "$rankFusion": rank_fusion(f) })],
        Stage::SetScore(MetaScore::Search) => vec![json!({ "$set": { fields::SCORE: { "$meta": "searchScore" } } })],
        Stage::SetScore(MetaScore::VectorSearch) => {
            vec![json!({ "$set": { fields::SCORE: { "$meta": "vectorSearchScore" } } })]
        }
        Stage::SetScore(MetaScore::Fusion) => vec![
            json!({ "$set": { fields::SCORE: { "$meta": "scoreDetails" } } }),
            json!({ "$set": { fields::SCORE: "$score.value" } }),
        ],
        Stage::Project(p) => vec![json!({ "$project": projection(p) })],
        Stage::Skip(n) => vec![json!({ "$skip": n })],
        Stage::Limit(n) => vec![json!({ "$limit": n })],
        Stage::FanOut { docs } => vec![json!({
            "$facet": {
                DOCS_BRANCH: render_stages(docs),
                COUNT_BRANCH: [{ "$count": TOTAL_FIELD }],
            }
        })],
        Stage::Total => vec![
            json!({ "$unwind": { "path": format!("${COUNT_BRANCH}"), "preserveNullAndEmptyArrays": true } }),
            json!({ "$addFields": { TOTAL_FIELD: { "$ifNull": [format!("${COUNT_BRANCH}.{TOTAL_FIELD}"), 0] } } }),
            json!({ "$project": { COUNT_BRANCH: 0 } }),
        ],
    }
}

fn match_filter(filter: &Filter) -> Value {
    match filter {
        Filter::Store(scope) => json!({ fields::INVENTORY: { "$elemMatch": { fields::STORE_ID: scope_value(scope) } } }),
        Filter::NamePrefix(prefix) => {
            json!({ fields::NAME: { "$regex": Filter::prefix_pattern(prefix), "$options": "i" } })
        }
        Filter::InStock(flag) => json!({ format!("{}.{}", fields::INVENTORY, fields::IN_STOCK): flag }),
        Filter::All(parts) => {
            let mut merged = Map::new();
            for part in parts {
                if let Value::Object(m) = match_filter(part) {
                    merged.extend(m);
                }
            }
            Value::Object(merged)
        }
    }
}

/// k-NN pre-filters only accept dotted equality paths.
fn vector_filter(filter: &Filter) -> Value {
    match filter {
        Filter::Store(scope) => json!({ format!("{}.{}", fields::INVENTORY, fields::STORE_ID): scope_value(scope) }),
        Filter::All(parts) => {
            let mut merged = Map::new();
            for part in parts {
                if let Value::Object(m) = vector_filter(part) {
                    merged.extend(m);
                }
            }
            Value::Object(merged)
        }
        other => match_filter(other),
    }
}

fn text_search(t: &TextSearch) -> Value {
    let should: Vec<Value> = t
        .clauses
        .iter()
        .map(|c| {
            json!({
                "text": {
                    "query": t.query,
                    "path": c.path,
                    "score": { "boost": { "value": c.boost } },
                    "fuzzy": { "maxEdits": c.max_edits },
                }
            })
        })
        .collect();
    json!({ "index": t.index, "compound": { "should": should } })
}

fn vector_search(v: &VectorSearch) -> Value {
    let mut body = json!({
        "index": v.index,
        "path": v.path,
        "queryVector": v.query_vector,
        "numCandidates": v.num_candidates,
        "limit": v.limit,
    });
    if let (Some(filter), Value::Object(map)) = (&v.filter, &mut body) {
        map.insert("filter".to_string(), vector_filter(filter));
    }
    body
}

fn rank_fusion(f: &RankFusion) -> Value {
    json!({
        "input": {
            "pipelines": {
                VECTOR_PIPELINE: render_stages(&f.vector),
                TEXT_PIPELINE: render_stages(&f.text),
            }
        },
        "combination": { "weights": { VECTOR_PIPELINE: f.weights.vector, TEXT_PIPELINE: f.weights.text } },
        "scoreDetails": f.score_details,
    })
}

fn projection(p: &Projection) -> Value {
    let mut map: Map<String, Value> = PRODUCT_FIELDS.iter().map(|f| (f.to_string(), json!(1))).collect();
    if p.include_score {
        map.insert(fields::SCORE.to_string(), json!(1));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{hybrid_plan, keyword_plan, text_plan, vector_plan};
    use crate::params::PlanParams;
    use catalog_core::types::{FusionWeights, Window};

    fn oid_scope() -> StoreScope {
        StoreScope::parse("65A1B2C3D4E5F6A7B8C9D0E1").expect("scope")
    }

    fn stage_keys(pipeline: &[Value]) -> Vec<String> {
        pipeline
            .iter()
            .filter_map(|s| s.as_object().and_then(|m| m.keys().next().cloned()))
            .collect()
    }

    #[test]
    fn keyword_pipeline_shape() {
        let pipeline = keyword_plan("a.b", &oid_scope(), Window::new(0, 10)).expect("plan").to_pipeline();
        assert_eq!(stage_keys(&pipeline), ["$match", "$facet", "$unwind", "$addFields", "$project"]);
        let m = &pipeline[0]["$match"];
        assert_eq!(m["inventorySummary"]["$elemMatch"]["storeObjectId"], json!({"$oid": "65a1b2c3d4e5f6a7b8c9d0e1"}));
        assert_eq!(m["productName"], json!({"$regex": "^a\\.b", "$options": "i"}));
        assert_eq!(pipeline[3]["$addFields"]["total"], json!({"$ifNull": ["$count.total", 0]}));
        assert_eq!(pipeline[1]["$facet"]["count"], json!([{"$count": "total"}]));
    }

    #[test]
    fn projection_never_includes_embedding() {
        let params = PlanParams::default();
        let scope = oid_scope();
        let pipeline = vector_plan(&[0.5, 0.5], &scope, Window::new(0, 10), &params.vector).expect("plan").to_pipeline();
        let project = &pipeline[2]["$facet"]["docs"][0]["$project"];
        assert_eq!(project["score"], json!(1));
        assert!(project.get(&params.vector.path).is_none());
        assert_eq!(
            pipeline[0]["$vectorSearch"]["filter"],
            json!({"inventorySummary.storeObjectId": {"$oid": "65a1b2c3d4e5f6a7b8c9d0e1"}})
        );
        assert_eq!(pipeline[1], json!({"$set": {"score": {"$meta": "vectorSearchScore"}}}));
    }

    #[test]
    fn text_pipeline_boosts() {
        let pipeline = text_plan("milk", &StoreScope::parse("downtown").expect("scope"), Window::new(20, 10), &PlanParams::default().text)
            .expect("plan")
            .to_pipeline();
        let should = &pipeline[0]["$search"]["compound"]["should"];
        assert_eq!(should[0]["text"]["path"], json!("productName"));
        assert_eq!(should[0]["text"]["fuzzy"]["maxEdits"], json!(2));
        assert_eq!(should[3]["text"]["path"], json!("subCategory"));
        assert_eq!(pipeline[1]["$match"]["inventorySummary"]["$elemMatch"]["storeObjectId"], json!("downtown"));
        assert_eq!(pipeline[3]["$facet"]["docs"][1], json!({"$skip": 20}));
    }

    #[test]
    fn hybrid_pipeline_weights_and_score() {
        let w = FusionWeights { vector: 0.7, text: 0.3 };
        let pipeline = hybrid_plan("milk", &[0.1], &oid_scope(), Window::new(0, 10), w, &PlanParams::default().hybrid)
            .expect("plan")
            .to_pipeline();
        assert_eq!(
            stage_keys(&pipeline),
            ["$rankFusion", "$match", "$set", "$set", "$facet", "$unwind", "$addFields", "$project"]
        );
        let fusion = &pipeline[0]["$rankFusion"];
        assert_eq!(fusion["combination"]["weights"], json!({"vectorPipeline": 0.7, "textPipeline": 0.3}));
        assert_eq!(fusion["scoreDetails"], json!(true));
        assert!(fusion["input"]["pipelines"]["vectorPipeline"][0]["$vectorSearch"].get("filter").is_none());
        assert_eq!(fusion["input"]["pipelines"]["textPipeline"][1], json!({"$limit": 200}));
        assert_eq!(pipeline[3], json!({"$set": {"score": "$score.value"}}));
    }
}
