//! Okta REST client for the directory stage.

use sari_core::collab::{AppAssignment, DirectoryClient, DirectoryUser};
use sari_core::{Result, SariError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub struct OktaClient {
    base_url: String,
    api_token: String,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProfile {
    #[serde(default)]
    ssh_pub_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    status: String,
    profile: UserProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentProfile {
    #[serde(default)]
    saml_roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Assignment {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    profile: AssignmentProfile,
}

impl OktaClient {
    /// Client for `https://<organization>.okta.com`.
    pub fn new(organization: &str, api_token: &str) -> Result<Self> {
        Self::with_base_url(format!("https://{organization}.okta.com"), api_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_token: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SariError::Collaborator(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            http,
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("Accept", "application/json")
            .header("Authorization", format!("SSWS {}", self.api_token))
            .send()
            .map_err(|e| SariError::Collaborator(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SariError::Collaborator(status.to_string()));
        }
        response
            .json()
            .map_err(|e| SariError::Collaborator(format!("unexpected response from {path}: {e}")))
    }
}

impl DirectoryClient for OktaClient {
    fn find_user_by_login(&self, login: &str) -> Result<Option<DirectoryUser>> {
        let search = format!("profile.login eq \"{login}\"");
        let users: Vec<User> = self.get("/api/v1/users", &[("limit", "1"), ("search", &search)])?;
        Ok(users.into_iter().next().map(|u| DirectoryUser {
            user_id: u.id,
            status: u.status,
            ssh_pubkey: u.profile.ssh_pub_key,
        }))
    }

    fn list_app_assignments(&self, app_id: &str) -> Result<Vec<AppAssignment>> {
        let entries: Vec<Assignment> = self.get(&format!("/api/v1/apps/{app_id}/users"), &[])?;
        Ok(entries
            .into_iter()
            .filter_map(|a| {
                a.external_id.map(|external_id| AppAssignment {
                    external_id,
                    roles: a.profile.saml_roles,
                })
            })
            .collect())
    }
}
