//! Companies registered on HireWise.

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Company as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: Option<String>,
    pub industry: String,
    pub size: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    /// Filename under the company logos folder.
    pub logo: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Company fields attached to an admin profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub industry: String,
    pub size: String,
    pub website: Option<String>,
    pub logo: Option<String>,
}

impl From<Company> for CompanySummary {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            name: company.name,
            email: company.email,
            industry: company.industry,
            size: company.size,
            website: company.website,
            logo: company
                .logo
                .map(|logo| format!("/uploads/company-logos/{logo}")),
        }
    }
}

#[derive(Clone)]
pub struct CompanyRepository {
    pool: Pool<Postgres>,
}

impl CompanyRepository {
    /// Create a new [`CompanyRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Whether a company already uses `name`, ignoring case.
    pub async fn name_taken(&self, name: &str) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM companies WHERE LOWER(name) = LOWER($1))",
        )
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await?;

        Ok(taken)
    }

    /// Find company using `id` field.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Company> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("Company"))
    }

    /// Insert [`Company`] using an open transaction.
    pub async fn insert(conn: &mut PgConnection, company: &Company) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO companies (id, name, email, phone, website, industry, size, address, city, country, description, logo)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(company.id)
        .bind(&company.name)
        .bind(&company.email)
        .bind(&company.phone)
        .bind(&company.website)
        .bind(&company.industry)
        .bind(&company.size)
        .bind(&company.address)
        .bind(&company.city)
        .bind(&company.country)
        .bind(&company.description)
        .bind(&company.logo)
        .execute(conn)
        .await?;

        Ok(())
    }
}
