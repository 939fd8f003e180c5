//! Sample content for running without a hosted backend.
//!
//! Mock mode uses the in-memory gateway, change feed and auth service seeded
//! from this module, so every command and view works offline.

use insights_auth::MemoryAuth;
use insights_gateway::{GatewayResult, MemoryGateway};
use insights_model::tables;
use serde_json::{json, Value};

/// Demo account with the admin role.
pub const DEMO_ADMIN_EMAIL: &str = "admin@myrightwindow.com";
/// Demo account with the plain user role.
pub const DEMO_USER_EMAIL: &str = "reader@myrightwindow.com";
/// Password shared by both demo accounts.
pub const DEMO_PASSWORD: &str = "insights-demo";

const DEMO_ADMIN_ID: &str = "00000000-0000-4000-8000-000000000001";
const DEMO_USER_ID: &str = "00000000-0000-4000-8000-000000000002";

const TRIPLE_TALAQ_ID: &str = "4d5e6f70-8a9b-4c0d-9e1f-2a3b4c5d6e7f";

/// Article rows as the hosted `blogs` table would return them.
///
/// Three are published and featured, one is published only and one is a
/// draft, newest first.
pub fn sample_articles() -> Vec<Value> {
    vec![
        json!({
            "id": "1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d",
            "title": "Arbitration Clauses After the 2024 Amendments",
            "slug": "arbitration-clauses-after-the-2024-amendments",
            "content": "The amended Act narrows the grounds on which courts may \
                        interfere with an award. Drafting teams should revisit seat, \
                        venue and emergency-relief language before renewing contracts.",
            "author": "Dr. Sarah Chen",
            "tags": ["Arbitration", "Commercial Law", "Contracts"],
            "images": ["https://images.unsplash.com/photo-1589829545856-d10d557cf95f?w=800&q=80"],
            "pdf_url": null,
            "pdf_name": null,
            "published": true,
            "featured": true,
            "created_at": "2024-12-01T10:30:00Z",
            "updated_at": "2024-12-01T10:30:00Z"
        }),
        json!({
            "id": "2b3c4d5e-6f7a-4b8c-9d0e-1f2a3b4c5d6e",
            "title": "Understanding Anticipatory Bail",
            "slug": "understanding-anticipatory-bail",
            "content": "Anticipatory bail protects a person who apprehends arrest. \
                        This guide walks through the conditions courts impose and the \
                        documents a client should prepare before the first hearing.",
            "author": "Alex Martinez",
            "tags": ["Criminal Law", "Bail", "Procedure"],
            "images": [
                {"url": "https://images.unsplash.com/photo-1505664194779-8beaceb93744?w=800&q=80", "alt": "Law books"}
            ],
            "pdf_url": "https://www.w3.org/WAI/ER/tests/xhtml/testfiles/resources/pdf/dummy.pdf",
            "pdf_name": "Anticipatory-Bail-Checklist.pdf",
            "published": true,
            "featured": true,
            "created_at": "2024-11-28T14:15:00Z",
            "updated_at": "2024-11-28T14:15:00Z"
        }),
        json!({
            "id": "3c4d5e6f-7a8b-4c9d-8e0f-1a2b3c4d5e6f",
            "title": "5 Questions to Ask Before Signing a Lease",
            "slug": "5-questions-to-ask-before-signing-a-lease",
            "content": "Lock-in periods, escalation clauses, maintenance charges, \
                        security deposits and registration costs decide whether a \
                        commercial lease works for a growing firm.",
            "author": "Jennifer Wong",
            "tags": ["Property", "Contracts", "Business"],
            "images": [],
            "pdf_url": null,
            "pdf_name": null,
            "published": true,
            "featured": true,
            "created_at": "2024-11-25T09:00:00Z",
            "updated_at": "2024-11-25T09:00:00Z"
        }),
        json!({
            "id": TRIPLE_TALAQ_ID,
            "title": "The Triple Talaq Verdict: A Landmark Supreme Court Judgment",
            "slug": "the-triple-talaq-verdict-a-landmark-supreme-court-judgment",
            "content": "In Shayara Bano v. Union of India the Supreme Court held \
                        instantaneous triple talaq unconstitutional. The judgment set \
                        out how personal law is tested against fundamental rights.",
            "author": "Vikas Sharma",
            "tags": ["Legal", "Supreme Court", "Constitutional Law", "Gavel", "Triple Talaq"],
            "images": [
                "https://images.unsplash.com/photo-1436450412740-6b988f486c6b?w=800&q=80"
            ],
            "pdf_url": null,
            "pdf_name": null,
            "published": true,
            "featured": false,
            "created_at": "2024-11-23T10:30:00Z",
            "updated_at": "2024-11-23T10:30:00Z"
        }),
        json!({
            "id": "5e6f7a8b-9c0d-4e1f-8a2b-3c4d5e6f7a8b",
            "title": "Draft: Data Protection Rules for Small Firms",
            "slug": "draft-data-protection-rules-for-small-firms",
            "content": "Work in progress.",
            "author": "Vikas Sharma",
            "tags": ["Privacy", "Compliance"],
            "images": [],
            "pdf_url": null,
            "pdf_name": null,
            "published": false,
            "featured": false,
            "created_at": "2024-11-20T08:00:00Z",
            "updated_at": null
        }),
    ]
}

fn sample_profiles() -> Vec<Value> {
    vec![
        json!({"id": DEMO_ADMIN_ID, "full_name": "Insights Editor", "avatar_url": null, "role": "admin"}),
        json!({"id": DEMO_USER_ID, "full_name": "Demo Reader", "avatar_url": null, "role": "user"}),
    ]
}

fn sample_comments() -> Vec<Value> {
    vec![json!({
        "id": "c0000000-0000-4000-8000-000000000001",
        "blog_id": TRIPLE_TALAQ_ID,
        "user_id": DEMO_USER_ID,
        "content": "Clear summary of the majority and dissenting opinions.",
        "parent_id": null,
        "created_at": "2024-11-24T08:15:00Z"
    })]
}

/// Fill a provisioned in-memory gateway with the sample rows.
pub(crate) fn seed_gateway(gateway: &MemoryGateway) -> GatewayResult<()> {
    gateway.seed(tables::ARTICLES, sample_articles())?;
    gateway.seed(tables::USER_PROFILES, sample_profiles())?;
    gateway.seed(tables::COMMENTS, sample_comments())?;
    Ok(())
}

/// Register the demo accounts.
pub(crate) fn seed_accounts(auth: &MemoryAuth) {
    auth.add_user(DEMO_ADMIN_EMAIL, DEMO_PASSWORD, DEMO_ADMIN_ID);
    auth.add_user(DEMO_USER_EMAIL, DEMO_PASSWORD, DEMO_USER_ID);
}
