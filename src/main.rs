use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;

use trekora_api::config::AppConfig;
use trekora_api::db;
use trekora_api::middleware::admin_auth::AdminAuthMiddleware;
use trekora_api::routes;
use trekora_api::services::booking_service::BookingService;
use trekora_api::services::booking_store::MongoBookingStore;
use trekora_api::services::catalog_service::{BookableItemLookup, MongoCatalog};
use trekora_api::services::notification_service::LogNotifier;
use trekora_api::services::payment::razorpay::RazorpayProvider;

const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    println!("Application starting...");

    env_logger::init_from_env(Env::default().default_filter_or("info"));

    if cfg!(debug_assertions) {
        dotenv::dotenv().ok();
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| PORT.to_string())
        .parse()
        .unwrap_or(PORT);

    let config = AppConfig::from_env();

    let mongo_uri = std::env::var("MONGODB_URI").expect("MONGODB_URI must be set");
    let client = db::mongo::create_mongo_client(&mongo_uri).await;
    println!("MongoDB connection established");

    let booking_store = MongoBookingStore::new(client.clone());
    booking_store
        .ensure_indexes()
        .await
        .expect("Failed to create booking indexes");

    let catalog: Arc<dyn BookableItemLookup> = Arc::new(MongoCatalog::new(client.clone()));
    let booking_service = web::Data::new(BookingService::new(
        Arc::new(booking_store),
        catalog.clone(),
        Arc::new(RazorpayProvider::new(
            config.razorpay_key_id.clone(),
            config.razorpay_key_secret.clone(),
        )),
        Arc::new(LogNotifier),
        config.currency.clone(),
    ));
    let catalog_data = web::Data::new(catalog);
    let config_data = web::Data::new(config);

    println!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .route("/health", web::get().to(|| async { "OK" }))
            .app_data(config_data.clone())
            .app_data(booking_service.clone())
            .app_data(catalog_data.clone())
            .service(
                web::scope("/api")
                    .route("/treks", web::get().to(routes::catalog::get_treks))
                    .route("/tours", web::get().to(routes::catalog::get_tours))
                    .service(
                        web::scope("/universal-bookings")
                            .route("/book", web::post().to(routes::booking::book))
                            .route(
                                "/verify-payment",
                                web::post().to(routes::booking::verify_payment),
                            ),
                    )
                    .service(
                        web::scope("/admin")
                            .wrap(AdminAuthMiddleware)
                            .route(
                                "/offline-booking",
                                web::post().to(routes::admin::create_offline_booking),
                            )
                            .route("/bookings", web::get().to(routes::admin::list_bookings)),
                    ),
            )
    })
    .bind((host, port))?
    .run()
    .await
}
