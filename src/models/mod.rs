pub mod booking;
pub mod interaction;
pub mod service;
pub mod session;
pub mod slot;
pub mod user;

pub use booking::{Booking, NewBooking};
pub use interaction::Interaction;
pub use service::Service;
pub use session::{
    ConversationState, Counters, Customer, Gender, PendingAccount, Profile, ProfileDraft,
    SelectedService, ServiceRequest, Session, SessionData, VehicleOwner, VehicleSpec,
};
pub use slot::Slot;
pub use user::{NewUser, NewVehicle, User, Vehicle};
