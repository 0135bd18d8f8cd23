//! Async TraCI client for a SUMO simulation.

pub mod constants;
mod storage;

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::infra::{SegmentId, SimError, Simulator};

use constants::*;
pub use storage::{CommandWriter, Status, Storage, SubscriptionBlock, TraciValue};
use storage::{frame_message, is_variable_subscription_response};

const CONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Variables the controlled vehicle is subscribed to while training.
const EGO_SUBSCRIPTION: [u8; 4] = [VAR_ROUTE_ID, VAR_ROAD_ID, VAR_POSITION, VAR_SPEED];

pub struct TraciConnection {
    stream: TcpStream,
    process: Option<Child>,
    subscriptions: HashMap<String, HashMap<u8, TraciValue>>,
}

impl TraciConnection {
    /// Connect to a simulator that is already listening.
    pub async fn connect(host: &str, port: u16, retries: u32) -> Result<Self, SimError> {
        let stream = connect_with_retry(host, port, retries).await?;
        let mut connection = Self {
            stream,
            process: None,
            subscriptions: HashMap::new(),
        };
        let (api, version) = connection.version().await?;
        info!("Connected to {} (TraCI API {}) at {}:{}", version, api, host, port);
        Ok(connection)
    }

    /// Start the simulator with the given configuration file and connect to it.
    pub async fn launch(
        binary: &str,
        config_file: &str,
        port: u16,
        retries: u32,
    ) -> Result<Self, SimError> {
        info!("Launching {} -c {} on port {}", binary, config_file, port);
        let child = Command::new(binary)
            .arg("-c")
            .arg(config_file)
            .arg("--remote-port")
            .arg(port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SimError::Launch(format!("{}: {}", binary, e)))?;

        let mut connection = Self::connect("127.0.0.1", port, retries).await?;
        connection.process = Some(child);
        Ok(connection)
    }

    /// Send one command and return the remaining response after its status.
    async fn send_command(&mut self, command_id: u8, writer: CommandWriter) -> Result<Storage, SimError> {
        let message = frame_message(&[writer.into_command(command_id)]);
        self.stream.write_all(&message).await?;

        let mut response = self.receive().await?;
        let status = Status::read(&mut response)?;
        if status.command_id != command_id {
            return Err(SimError::Protocol(format!(
                "status for command 0x{:02x} received while waiting for 0x{:02x}",
                status.command_id, command_id
            )));
        }
        if !status.is_ok() {
            let kind = if status.result == RTYPE_NOTIMPLEMENTED {
                "not implemented"
            } else {
                "error"
            };
            return Err(SimError::CommandFailed {
                command: command_id,
                message: format!("{}: {}", kind, status.description),
            });
        }
        Ok(response)
    }

    async fn receive(&mut self) -> Result<Storage, SimError> {
        let total = self.stream.read_u32().await? as usize;
        let len = total
            .checked_sub(4)
            .ok_or_else(|| SimError::Protocol(format!("message length {} too small", total)))?;
        let mut buf = BytesMut::zeroed(len);
        self.stream.read_exact(&mut buf).await?;
        Ok(Storage::new(buf.freeze()))
    }

    /// Read a variable through a get command and return the typed value.
    async fn get_variable(
        &mut self,
        command_id: u8,
        variable: u8,
        object_id: &str,
        params: Option<CommandWriter>,
    ) -> Result<TraciValue, SimError> {
        let mut writer = CommandWriter::new();
        writer.put_u8(variable).put_str(object_id);
        let writer = match params {
            Some(params) => writer.append(params),
            None => writer,
        };

        let mut response = self.send_command(command_id, writer).await?;
        let (response_id, mut content) = response.read_command()?;
        if response_id != command_id + RESPONSE_GET_OFFSET {
            return Err(SimError::Protocol(format!(
                "unexpected response 0x{:02x} to get command 0x{:02x}",
                response_id, command_id
            )));
        }
        let returned_variable = content.read_u8()?;
        let returned_object = content.read_string()?;
        if returned_variable != variable || returned_object != object_id {
            return Err(SimError::Protocol(format!(
                "response for variable 0x{:02x} of '{}' does not match request",
                returned_variable, returned_object
            )));
        }
        content.read_typed()
    }

    async fn set_variable(
        &mut self,
        command_id: u8,
        variable: u8,
        object_id: &str,
        value: CommandWriter,
    ) -> Result<(), SimError> {
        let mut writer = CommandWriter::new();
        writer.put_u8(variable).put_str(object_id);
        self.send_command(command_id, writer.append(value)).await?;
        Ok(())
    }

    pub async fn version(&mut self) -> Result<(i32, String), SimError> {
        let mut response = self.send_command(CMD_GETVERSION, CommandWriter::new()).await?;
        let (_, mut content) = response.read_command()?;
        Ok((content.read_i32()?, content.read_string()?))
    }

    /// Advance the simulation by one step and refresh subscription results.
    pub async fn simulation_step(&mut self) -> Result<(), SimError> {
        let mut writer = CommandWriter::new();
        writer.put_f64(0.0);
        let mut response = self.send_command(CMD_SIMSTEP, writer).await?;

        self.subscriptions.clear();
        let count = response.read_i32()?;
        for _ in 0..count {
            let (response_id, mut content) = response.read_command()?;
            if is_variable_subscription_response(response_id) {
                self.store_subscription(SubscriptionBlock::read(response_id, &mut content)?);
            } else {
                debug!("Ignoring subscription response 0x{:02x}", response_id);
            }
        }
        Ok(())
    }

    fn store_subscription(&mut self, block: SubscriptionBlock) {
        let values = self.subscriptions.entry(block.object_id).or_default();
        values.extend(block.values);
    }

    pub async fn simulation_time(&mut self) -> Result<f64, SimError> {
        let value = self.get_variable(CMD_GET_SIM_VARIABLE, VAR_TIME, "", None).await?;
        value
            .as_f64()
            .ok_or_else(|| SimError::Protocol(format!("simulation time has type {:?}", value)))
    }

    pub async fn edge_ids(&mut self) -> Result<Vec<String>, SimError> {
        self.id_list(CMD_GET_EDGE_VARIABLE).await
    }

    pub async fn vehicle_ids(&mut self) -> Result<Vec<String>, SimError> {
        self.id_list(CMD_GET_VEHICLE_VARIABLE).await
    }

    /// Vehicles added but not yet inserted into the network.
    pub async fn pending_vehicle_ids(&mut self) -> Result<Vec<String>, SimError> {
        match self.get_variable(CMD_GET_SIM_VARIABLE, VAR_PENDING_VEHICLES, "", None).await? {
            TraciValue::StrList(ids) => Ok(ids),
            other => Err(SimError::Protocol(format!("pending vehicles have type {:?}", other))),
        }
    }

    async fn id_list(&mut self, command_id: u8) -> Result<Vec<String>, SimError> {
        match self.get_variable(command_id, TRACI_ID_LIST, "", None).await? {
            TraciValue::StrList(ids) => Ok(ids),
            other => Err(SimError::Protocol(format!("id list has type {:?}", other))),
        }
    }

    /// Insert a vehicle on an existing route.
    pub async fn add_vehicle(&mut self, vehicle_id: &str, route_id: &str, depart: &str) -> Result<(), SimError> {
        let mut value = CommandWriter::new();
        value
            .put_compound_header(14)
            .put_typed_str(route_id)
            .put_typed_str("DEFAULT_VEHTYPE")
            .put_typed_str(depart)
            .put_typed_str("first")
            .put_typed_str("base")
            .put_typed_str("0")
            .put_typed_str("current")
            .put_typed_str("max")
            .put_typed_str("current")
            .put_typed_str("")
            .put_typed_str("")
            .put_typed_str("")
            .put_typed_int(0)
            .put_typed_int(0);
        self.set_variable(CMD_SET_VEHICLE_VARIABLE, ADD_FULL, vehicle_id, value)
            .await
    }

    pub async fn add_route<S: AsRef<str>>(&mut self, route_id: &str, edges: &[S]) -> Result<(), SimError> {
        let mut value = CommandWriter::new();
        value.put_typed_str_list(edges);
        self.set_variable(CMD_SET_ROUTE_VARIABLE, ADD, route_id, value)
            .await
    }

    pub async fn set_route<S: AsRef<str>>(&mut self, vehicle_id: &str, edges: &[S]) -> Result<(), SimError> {
        let mut value = CommandWriter::new();
        value.put_typed_str_list(edges);
        self.set_variable(CMD_SET_VEHICLE_VARIABLE, VAR_ROUTE, vehicle_id, value)
            .await
    }

    pub async fn remove_vehicle(&mut self, vehicle_id: &str) -> Result<(), SimError> {
        let mut value = CommandWriter::new();
        value.put_typed_byte(REMOVE_VAPORIZED);
        self.set_variable(CMD_SET_VEHICLE_VARIABLE, REMOVE, vehicle_id, value)
            .await?;
        self.subscriptions.remove(vehicle_id);
        Ok(())
    }

    /// Subscribe to vehicle variables.
    pub async fn subscribe_vehicle(&mut self, vehicle_id: &str, variables: &[u8]) -> Result<(), SimError> {
        let mut writer = CommandWriter::new();
        writer
            .put_f64(INVALID_DOUBLE_VALUE)
            .put_f64(INVALID_DOUBLE_VALUE)
            .put_str(vehicle_id)
            .put_u8(variables.len() as u8);
        for variable in variables {
            writer.put_u8(*variable);
        }

        let mut response = self
            .send_command(CMD_SUBSCRIBE_VEHICLE_VARIABLE, writer)
            .await?;
        if !response.is_empty() {
            let (response_id, mut content) = response.read_command()?;
            if is_variable_subscription_response(response_id) {
                self.store_subscription(SubscriptionBlock::read(response_id, &mut content)?);
            }
        }
        Ok(())
    }

    /// Latest subscribed values for an object, if it reported any this step.
    pub fn subscription_results(&self, object_id: &str) -> Option<&HashMap<u8, TraciValue>> {
        self.subscriptions.get(object_id)
    }

    /// Distance between two road positions, air distance unless `driving`.
    pub async fn distance_road(
        &mut self,
        from_edge: &str,
        from_pos: f64,
        to_edge: &str,
        to_pos: f64,
        driving: bool,
    ) -> Result<f64, SimError> {
        let mut params = CommandWriter::new();
        params
            .put_compound_header(3)
            .put_roadmap_position(from_edge, from_pos, 0)
            .put_roadmap_position(to_edge, to_pos, 0)
            .put_typed_ubyte(if driving {
                REQUEST_DRIVINGDIST
            } else {
                REQUEST_AIRDIST
            });

        let value = self
            .get_variable(CMD_GET_SIM_VARIABLE, DISTANCE_REQUEST, "", Some(params))
            .await?;
        value
            .as_f64()
            .ok_or_else(|| SimError::Protocol(format!("distance has type {:?}", value)))
    }

    /// Close the connection and wait for a launched simulator to exit.
    pub async fn close(mut self) -> Result<(), SimError> {
        self.send_command(CMD_CLOSE, CommandWriter::new()).await?;
        if let Some(mut child) = self.process.take() {
            match child.wait().await {
                Ok(status) => info!("Simulator exited with {}", status),
                Err(e) => warn!("Failed to wait for simulator: {}", e),
            }
        }
        Ok(())
    }
}

async fn connect_with_retry(host: &str, port: u16, retries: u32) -> Result<TcpStream, SimError> {
    let mut attempt = 0;
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!("Connect to {}:{} failed ({}), retry {}/{}", host, port, e, attempt, retries);
                tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
            }
            Err(e) => return Err(SimError::Io(e)),
        }
    }
}

impl Simulator for TraciConnection {
    async fn segment_ids(&mut self) -> Result<Vec<SegmentId>, SimError> {
        self.edge_ids().await
    }

    async fn advance_tick(&mut self) -> Result<(), SimError> {
        self.simulation_step().await
    }

    fn current_segment_of(&self, vehicle_id: &str) -> Option<SegmentId> {
        self.subscription_results(vehicle_id)
            .and_then(|values| values.get(&VAR_ROAD_ID))
            .and_then(TraciValue::as_str)
            .filter(|road| !road.is_empty())
            .map(str::to_string)
    }

    async fn set_upcoming_route(&mut self, vehicle_id: &str, route: &[SegmentId]) -> Result<(), SimError> {
        self.set_route(vehicle_id, route).await
    }

    async fn spawn_vehicle(&mut self, vehicle_id: &str, route_id: &str) -> Result<(), SimError> {
        self.add_vehicle(vehicle_id, route_id, "now").await?;
        self.subscribe_vehicle(vehicle_id, &EGO_SUBSCRIPTION).await
    }

    async fn vehicle_exists(&mut self, vehicle_id: &str) -> Result<bool, SimError> {
        if self.vehicle_ids().await?.iter().any(|id| id == vehicle_id) {
            return Ok(true);
        }
        Ok(self.pending_vehicle_ids().await?.iter().any(|id| id == vehicle_id))
    }

    /// SUMO drops the subscriptions of a removed vehicle, so only the local
    /// results are cleared.
    async fn remove_vehicle(&mut self, vehicle_id: &str) -> Result<(), SimError> {
        TraciConnection::remove_vehicle(self, vehicle_id).await
    }

    async fn distance_between(&mut self, from: &str, to: &str) -> Result<f64, SimError> {
        self.distance_road(from, 0.0, to, 0.0, false).await
    }
}
