pub mod ask;
pub mod feedback;
pub mod model;
pub mod predict;
pub mod system;

use actix_web::web;

/// Register every API route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ask::ask_qhse_expert)
        .service(ask::ask_qhse_expert_get)
        .service(predict::predict)
        .service(model::save_model)
        .service(model::train_and_save_model)
        .service(feedback::list_feedback)
        .service(feedback::apply_feedback)
        .service(system::health)
        .service(system::index);
}
