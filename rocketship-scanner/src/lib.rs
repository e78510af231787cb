//! Rocketship Scanner - Webhook processing and repository reconciliation
//!
//! This crate turns GitHub App webhooks into scans of `.rocketship` directories and
//! serves the control plane HTTP API.
//!
//! # Features
//!
//! - **Webhook intake**: signature verification, delivery audit, event classification
//! - **Full scans**: walk the repository tree at a ref, upsert suites and tests, tombstone removals
//! - **Delta scans**: apply only the suite files a pull request changed
//! - **Pull request lifecycle**: deactivate on close or merge, restore on reopen
//! - **Bootstrap**: scan a newly connected repository and its open pull requests
//!
//! # Architecture
//!
//! ```text
//! rocketship-scanner/
//! ├── presentation/     # HTTP layer
//! │   ├── controllers/  # Webhook, GitHub App, scan attempt handlers
//! │   ├── models.rs     # DTOs with OpenAPI schemas
//! │   └── routes.rs     # Router, CORS, timeouts, Swagger UI
//! ├── application/      # Use cases
//! │   ├── classifier.rs # Webhook -> lifecycle / head update / scan decision
//! │   ├── scanner.rs    # Full and delta scans
//! │   └── use_cases.rs  # Webhook, bootstrap, installation operations
//! ├── infrastructure/   # Webhook signature verification
//! └── domain/           # Scan phases, scan outcomes, webhook payloads
//! ```
//!
//! # API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/github-app/webhook` | POST | GitHub App webhook receiver |
//! | `/api/v1/organizations/{org_id}/github-app/status` | GET | Installation status |
//! | `/api/v1/organizations/{org_id}/github-app/installations` | POST | Bind an installation |
//! | `/api/v1/organizations/{org_id}/github-app/repos` | GET | Repositories visible to the installation |
//! | `/api/v1/organizations/{org_id}/github-app/connect` | POST | Bootstrap a repository |
//! | `/api/v1/organizations/{org_id}/scan-attempts` | GET | Recent scan attempts |
//! | `/health` | GET | Health check |

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
