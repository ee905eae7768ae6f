//! HTTP endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/v1/authorize` | POST | Run the permission gate for a resource |
//! | `/v1/roles/assign` | POST | Assign roles to users and invited emails |
//! | `/v1/roles/remove` | POST | Remove one role from a user |
//! | `/v1/roles/reconcile` | POST | Set a user's roles to an exact set |
//! | `/v1/roles/members` | POST | List users holding roles on a resource |
//! | `/health` | GET | Liveness |
//! | `/ready` | GET | Readiness (policy engine reachable) |
//! | `/metrics` | GET | Prometheus metrics |

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_observability, AuthorizeResponse, MembersResponse,
    DEFAULT_BODY_LIMIT, ORGANIZATION_HEADER, USER_MAIL_HEADER,
};
pub use state::{AppState, Backends};
